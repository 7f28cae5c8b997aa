mod base;
mod essential;
mod fundamental;

pub use base::{Consensus, MatrixResult, MatrixSolver, MatrixSolverTrait};
pub use essential::{decompose_essential, essential_from_fundamental, PoseCandidates};
pub use fundamental::{FundamentalSolver, FundamentalSolverTrait};
