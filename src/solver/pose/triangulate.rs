use super::super::base::Solver;
use super::super::linalg::null_space;
use crate::error::SolverError;
use crate::num::{Matrix3x4, Number, Point2, Vector4};

use nalgebra::DMatrix;

/// Linear (DLT) triangulation of one correspondence.
///
/// Yields the unit-norm homogeneous point, `None` when the system cannot be
/// decomposed.
pub struct Triangulator<'a> {
    pub projection_old: &'a Matrix3x4,
    pub projection_new: &'a Matrix3x4,

    pub point_old: &'a Point2,
    pub point_new: &'a Point2,
}

impl<'a> Solver<Option<Vector4>> for Triangulator<'a> {
    fn solve(self, _: usize) -> Option<Vector4> {
        let mut matrix_a = DMatrix::<Number>::zeros(4, 4);

        let views = [
            (self.projection_old, self.point_old),
            (self.projection_new, self.point_new),
        ];
        for (i, (projection, point)) in views.iter().enumerate() {
            let row_x = point.x * projection.row(2) - projection.row(0);
            let row_y = point.y * projection.row(2) - projection.row(1);
            matrix_a.row_mut(2 * i).copy_from(&row_x);
            matrix_a.row_mut(2 * i + 1).copy_from(&row_y);
        }

        let null = null_space(&matrix_a)?;
        Some(Vector4::from_column_slice(null.vector.as_slice()))
    }
}

/// Triangulate index-aligned correspondences and scale each result to `w = 1`.
///
/// A point whose homogeneous coordinate does not exceed `epsilon` lies at
/// (or numerically near) infinity and fails the whole set.
pub fn triangulate_points(
    projection_old: &Matrix3x4,
    projection_new: &Matrix3x4,
    pts_old: &[Point2],
    pts_new: &[Point2],
    epsilon: Number,
) -> Result<Vec<Vector4>, SolverError> {
    if pts_old.len() != pts_new.len() {
        return Err(SolverError::LengthMismatch {
            left: pts_old.len(),
            right: pts_new.len(),
        });
    }

    pts_old
        .iter()
        .zip(pts_new.iter())
        .enumerate()
        .map(|(index, (point_old, point_new))| {
            let homogeneous = Triangulator {
                projection_old,
                projection_new,
                point_old,
                point_new,
            }
            .solve_to_end()
            .ok_or(SolverError::TriangulationDegenerate { index })?;

            dehomogenize(&homogeneous, epsilon).ok_or(SolverError::TriangulationDegenerate { index })
        })
        .collect()
}

/// Divide by `w`; `None` when `|w|` is too small relative to the point.
#[inline]
pub fn dehomogenize(point: &Vector4, epsilon: Number) -> Option<Vector4> {
    let w = point.w;
    if !(w.abs() > epsilon * point.norm()) {
        return None;
    }
    Some(point / w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::num::{Matrix3, Vector3};
    use crate::slam3d::Pose;
    use crate::solver::synthetic::{default_intrinsics, Scene};

    use approx::assert_relative_eq;

    #[test]
    fn test_project_then_triangulate() {
        let scene = Scene::default_pair(25);
        let points = triangulate_points(
            &scene.projection_1(),
            &scene.projection_2(),
            &scene.pts1,
            &scene.pts2,
            1e-12,
        )
        .unwrap();

        assert_eq!(points.len(), scene.points.len());
        for (recovered, truth) in points.iter().zip(scene.points.iter()) {
            assert_relative_eq!(recovered.w, 1.0);
            assert_relative_eq!(recovered.xyz(), truth.coords, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_parallel_rays_are_degenerate() {
        // a pure sideways step observing the same pixel: the rays meet at infinity
        let k = default_intrinsics().matrix();
        let projection_old = Pose::identity().projection(&k);
        let projection_new =
            Pose::new(Matrix3::identity(), Vector3::new(1.0, 0.0, 0.0)).projection(&k);
        let pts = vec![Point2::new(300.0, 200.0)];

        let err = triangulate_points(&projection_old, &projection_new, &pts, &pts, 1e-9)
            .unwrap_err();
        assert_eq!(err, SolverError::TriangulationDegenerate { index: 0 });
    }

    #[test]
    fn test_dehomogenize() {
        let point = Vector4::new(2.0, 4.0, 6.0, 2.0);
        assert_eq!(dehomogenize(&point, 1e-12), Some(Vector4::new(1.0, 2.0, 3.0, 1.0)));
        assert_eq!(dehomogenize(&Vector4::new(1.0, 0.0, 0.0, 0.0), 1e-12), None);
    }
}
