//! Sparse incremental structure from motion over an ordered image sequence,
//! built from chained two-view reconstructions.

pub mod camera;
pub mod cloud;
pub mod config;
pub mod dataset;
pub mod error;
pub mod feature;
pub mod matcher;
pub mod num;
pub mod pipeline;
pub mod slam3d;
pub mod solver;

pub use camera::Intrinsics;
pub use cloud::PointCloud;
pub use config::ReconstructionConfig;
pub use dataset::Frame;
pub use error::{DatasetError, ReconstructionError, SolverError, Stage};
pub use feature::{FeatureExtractor, Features, JsonFeatureExtractor};
pub use pipeline::{reconstruct_pair, Phase, Reconstruction, ReconstructionOutput};
pub use slam3d::{ChainState, Pose};
