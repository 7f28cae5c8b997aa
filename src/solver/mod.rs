mod base;
mod common;
pub(crate) mod linalg;
mod matrix;
mod pose;

#[cfg(test)]
pub(crate) mod synthetic;

pub use base::Solver;
pub use common::{is_collinear, normalize};
pub use matrix::*;
pub use pose::*;
