use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Failures of a single two-view computation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    #[error("need at least {required} correspondences, got {found}")]
    InsufficientMatches { found: usize, required: usize },
    #[error("no epipolar model reached {required} inliers (best had {inliers})")]
    DegenerateGeometry { inliers: usize, required: usize },
    #[error("cheirality check is ambiguous (best {best} valid points, runner-up {runner_up})")]
    AmbiguousPose { best: usize, runner_up: usize },
    #[error("triangulated point {index} has a vanishing homogeneous coordinate")]
    TriangulationDegenerate { index: usize },
    #[error("correspondence lists differ in length ({left} vs {right})")]
    LengthMismatch { left: usize, right: usize },
    #[error("descriptor has dimension {found}, expected {expected}")]
    DescriptorDimension { expected: usize, found: usize },
}

/// Pipeline stage a pairwise failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Matching,
    Geometry,
    Pose,
    Triangulation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Matching => "matching",
            Stage::Geometry => "fundamental matrix estimation",
            Stage::Pose => "pose recovery",
            Stage::Triangulation => "triangulation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ReconstructionError {
    #[error("pair ({previous} -> {current}) failed during {stage}: {source}")]
    Pair {
        previous: String,
        current: String,
        stage: Stage,
        #[source]
        source: SolverError,
    },
    #[error("feature extraction failed for {frame}")]
    Extraction {
        frame: String,
        #[source]
        source: BoxError,
    },
    #[error("bundle adjustment failed for {frame}")]
    Refinement {
        frame: String,
        #[source]
        source: BoxError,
    },
    #[error("reconstruction is already finished")]
    Finished,
}

impl ReconstructionError {
    /// The solver failure behind a pairwise abort, if any.
    pub fn solver_error(&self) -> Option<&SolverError> {
        match self {
            ReconstructionError::Pair { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("failed to decode {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("camera {0} is not described in the calibration file")]
    UnknownCamera(u32),
    #[error("image {0} is not listed in the image metadata")]
    UnknownImage(String),
    #[error("invalid intrinsics: {0}")]
    InvalidIntrinsics(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
