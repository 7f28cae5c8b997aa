use std::fs;
use std::path::Path;

use crate::error::DatasetError;
use crate::num::Number;

use serde::{Deserialize, Serialize};

/// Smallest correspondence set the 8-point solver accepts.
pub const MIN_SET_SIZE: usize = 8;

/// Default number of RANSAC hypotheses.
pub const RANSAC_ITERATIONS: usize = 512;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Only frames taken by this camera are processed.
    pub camera_id: u32,
    /// Half-open slice of the sorted image listing, applied before the camera filter.
    pub frame_range: Option<(usize, usize)>,
    pub matcher: MatcherConfig,
    pub ransac: RansacConfig,
    pub pose: PoseConfig,
    pub triangulation_epsilon: Number,
    pub bundle_adjustment: BundleAdjustmentConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Lowe's distance ratio.
    pub ratio: Number,
    pub min_matches: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    pub iterations: usize,
    /// Expected keypoint noise in pixels.
    pub sigma: Number,
    pub min_inliers: usize,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Number of correspondences triangulated per candidate, 0 for all.
    pub sample_points: usize,
    /// Fraction of samples that must pass the cheirality check.
    pub min_valid_ratio: Number,
    /// Samples further than this (in baseline units) are not counted. No
    /// limit when unset.
    pub max_depth: Option<Number>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleAdjustmentConfig {
    pub enabled: bool,
    pub iterations: usize,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            camera_id: 1,
            frame_range: None,
            matcher: MatcherConfig::default(),
            ransac: RansacConfig::default(),
            pose: PoseConfig::default(),
            triangulation_epsilon: 1e-12,
            bundle_adjustment: BundleAdjustmentConfig::default(),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            ratio: 0.7,
            min_matches: MIN_SET_SIZE,
        }
    }
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            iterations: RANSAC_ITERATIONS,
            sigma: 1.0,
            min_inliers: MIN_SET_SIZE,
            seed: None,
        }
    }
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            sample_points: 100,
            min_valid_ratio: 0.05,
            max_depth: None,
        }
    }
}

impl Default for BundleAdjustmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            iterations: 10,
        }
    }
}

impl ReconstructionConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|source| DatasetError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DatasetError> {
        let invalid = |message: &str| Err(DatasetError::InvalidConfig(message.to_string()));

        if !(self.matcher.ratio > 0.0 && self.matcher.ratio <= 1.0) {
            return invalid("matcher.ratio must lie in (0, 1]");
        }
        if self.matcher.min_matches < MIN_SET_SIZE {
            return invalid("matcher.min_matches must be at least 8");
        }
        if !(self.ransac.sigma > 0.0) {
            return invalid("ransac.sigma must be positive");
        }
        if self.ransac.min_inliers < MIN_SET_SIZE {
            return invalid("ransac.min_inliers must be at least 8");
        }
        if self.ransac.iterations == 0 {
            return invalid("ransac.iterations must be positive");
        }
        if !(self.pose.min_valid_ratio >= 0.0 && self.pose.min_valid_ratio <= 1.0) {
            return invalid("pose.min_valid_ratio must lie in [0, 1]");
        }
        if let Some(max_depth) = self.pose.max_depth {
            if !(max_depth > 0.0) {
                return invalid("pose.max_depth must be positive");
            }
        }
        if !(self.triangulation_epsilon >= 0.0) {
            return invalid("triangulation_epsilon must not be negative");
        }
        if let Some((start, end)) = self.frame_range {
            if start > end {
                return invalid("frame_range start exceeds its end");
            }
        }
        Ok(())
    }
}
