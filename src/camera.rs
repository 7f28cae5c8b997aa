//! Pinhole intrinsics shared by every frame of a run.

use crate::error::DatasetError;
use crate::num::{Matrix3, Number, Point2};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: Number,
    pub fy: Number,
    pub cx: Number,
    pub cy: Number,
}

impl Intrinsics {
    pub fn new(fx: Number, fy: Number, cx: Number, cy: Number) -> Result<Self, DatasetError> {
        let finite = [fx, fy, cx, cy].iter().all(|v| v.is_finite());
        if !finite || fx <= 0.0 || fy <= 0.0 {
            return Err(DatasetError::InvalidIntrinsics(format!(
                "fx={}, fy={}, cx={}, cy={}",
                fx, fy, cx, cy
            )));
        }
        Ok(Self { fx, fy, cx, cy })
    }

    /// The calibration matrix `K`.
    #[inline]
    pub fn matrix(&self) -> Matrix3 {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Pixel coordinates to the normalized image plane.
    #[inline]
    pub fn unproject(&self, pixel: &Point2) -> Point2 {
        Point2::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy)
    }

    /// Normalized image plane to pixel coordinates.
    #[inline]
    pub fn project(&self, normalized: &Point2) -> Point2 {
        Point2::new(
            normalized.x * self.fx + self.cx,
            normalized.y * self.fy + self.cy,
        )
    }
}
