//! Keypoints with descriptors, and where they come from.

use std::fs;
use std::path::{Path, PathBuf};

use crate::dataset::Frame;
use crate::error::{DatasetError, SolverError};
use crate::num::Point2;

use serde::Deserialize;

/// Keypoints of one frame with one descriptor each, all of the same dimension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Features {
    keypoints: Vec<Point2>,
    descriptors: Vec<Vec<f32>>,
}

impl Features {
    pub fn new(keypoints: Vec<Point2>, descriptors: Vec<Vec<f32>>) -> Result<Self, SolverError> {
        if keypoints.len() != descriptors.len() {
            return Err(SolverError::LengthMismatch {
                left: keypoints.len(),
                right: descriptors.len(),
            });
        }
        if let Some(first) = descriptors.first() {
            let expected = first.len();
            if let Some(other) = descriptors.iter().find(|d| d.len() != expected) {
                return Err(SolverError::DescriptorDimension {
                    expected,
                    found: other.len(),
                });
            }
        }
        Ok(Self {
            keypoints,
            descriptors,
        })
    }

    pub fn keypoints(&self) -> &[Point2] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &[Vec<f32>] {
        &self.descriptors
    }

    /// Descriptor dimension, `None` for an empty set.
    pub fn dimension(&self) -> Option<usize> {
        self.descriptors.first().map(Vec::len)
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Source of keypoints and descriptors for a frame.
pub trait FeatureExtractor: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn extract(&self, frame: &Frame) -> Result<Features, Self::Error>;
}

/// Reads precomputed features from `<dir>/<image name>.json`.
#[derive(Debug, Clone)]
pub struct JsonFeatureExtractor {
    dir: PathBuf,
}

#[derive(Deserialize)]
struct FeatureFile {
    keypoints: Vec<[f64; 2]>,
    descriptors: Vec<Vec<f32>>,
}

impl JsonFeatureExtractor {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, frame: &Frame) -> PathBuf {
        self.dir.join(format!("{}.json", frame.name))
    }

    fn load(path: &Path) -> Result<Features, DatasetError> {
        let data = fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FeatureFile = serde_json::from_str(&data).map_err(|source| DatasetError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        let keypoints = file
            .keypoints
            .iter()
            .map(|&[x, y]| Point2::new(x, y))
            .collect();
        Features::new(keypoints, file.descriptors).map_err(|err| DatasetError::Parse {
            path: path.to_path_buf(),
            line: 0,
            message: err.to_string(),
        })
    }
}

impl FeatureExtractor for JsonFeatureExtractor {
    type Error = DatasetError;

    fn extract(&self, frame: &Frame) -> Result<Features, DatasetError> {
        Self::load(&self.path_for(frame))
    }
}
