use crate::error::SolverError;
use crate::num::{Matrix3x4, Number, Point2, Vector2, Vector4};

use serde::{Deserialize, Serialize};

/// Observed point minus the projection of its 3D point, in pixels.
///
/// A point projecting onto the camera plane (zero depth) has an infinite
/// residual.
#[inline]
pub fn reprojection_residual(projection: &Matrix3x4, point: &Vector4, observed: &Point2) -> Vector2 {
    let projected = projection * point;
    if projected.z == 0.0 {
        return Vector2::repeat(Number::INFINITY);
    }
    Vector2::new(
        observed.x - projected.x / projected.z,
        observed.y - projected.y / projected.z,
    )
}

/// Residuals of every point, in input order.
pub fn reprojection_residuals(
    projection: &Matrix3x4,
    points: &[Vector4],
    observed: &[Point2],
) -> Result<Vec<Vector2>, SolverError> {
    if points.len() != observed.len() {
        return Err(SolverError::LengthMismatch {
            left: points.len(),
            right: observed.len(),
        });
    }
    Ok(points
        .iter()
        .zip(observed.iter())
        .map(|(point, observed)| reprojection_residual(projection, point, observed))
        .collect())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResidualSummary {
    pub count: usize,
    pub mean: Number,
    pub rms: Number,
    pub max: Number,
}

impl ResidualSummary {
    pub fn from_residuals(residuals: &[Vector2]) -> Self {
        if residuals.is_empty() {
            return Self::default();
        }
        let count = residuals.len();
        let (sum, sum_sq, max) = residuals.iter().map(|r| r.norm()).fold(
            (0.0, 0.0, 0.0 as Number),
            |(sum, sum_sq, max), norm| (sum + norm, sum_sq + norm * norm, max.max(norm)),
        );
        Self {
            count,
            mean: sum / count as Number,
            rms: (sum_sq / count as Number).sqrt(),
            max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::pose::triangulate_points;
    use crate::solver::synthetic::Scene;

    use approx::assert_relative_eq;

    #[test]
    fn test_triangulated_points_reproject_onto_observations() {
        let scene = Scene::default_pair(30);
        let projection_2 = scene.projection_2();
        let points = triangulate_points(
            &scene.projection_1(),
            &projection_2,
            &scene.pts1,
            &scene.pts2,
            1e-12,
        )
        .unwrap();

        let residuals = reprojection_residuals(&projection_2, &points, &scene.pts2).unwrap();
        assert_eq!(residuals.len(), 30);
        let summary = ResidualSummary::from_residuals(&residuals);
        assert!(summary.max < 1e-6, "max residual {}", summary.max);
    }

    #[test]
    fn test_residual_sign_and_scale() {
        let projection = Matrix3x4::new(
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        );
        // (2, 4, 2) projects to (1, 2) regardless of the homogeneous scale
        let point = Vector4::new(4.0, 8.0, 4.0, 2.0);
        let residual = reprojection_residual(&projection, &point, &Point2::new(1.5, 1.0));
        assert_relative_eq!(residual, Vector2::new(0.5, -1.0));
    }

    #[test]
    fn test_summary() {
        let residuals = vec![Vector2::new(3.0, 4.0), Vector2::new(0.0, 0.0)];
        let summary = ResidualSummary::from_residuals(&residuals);
        assert_eq!(summary.count, 2);
        assert_relative_eq!(summary.mean, 2.5);
        assert_relative_eq!(summary.max, 5.0);
        assert_relative_eq!(summary.rms, (12.5 as Number).sqrt());
    }

    #[test]
    fn test_length_mismatch() {
        let projection = Matrix3x4::identity();
        let err = reprojection_residuals(&projection, &[Vector4::zeros()], &[]).unwrap_err();
        assert_eq!(err, SolverError::LengthMismatch { left: 1, right: 0 });
    }
}
