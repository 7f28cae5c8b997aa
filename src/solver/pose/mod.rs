mod base;
mod refine;
mod reprojection;
mod triangulate;

pub use base::{recover_pose, RecoveredPose};
pub use refine::{AlternatingRefiner, BundleAdjuster, Refined};
pub use reprojection::{reprojection_residual, reprojection_residuals, ResidualSummary};
pub use triangulate::{dehomogenize, triangulate_points, Triangulator};
