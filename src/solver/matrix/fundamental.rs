use super::base::{Consensus, MatrixSolver, MatrixSolverTrait};
use crate::num::{Matrix3, Number, Point2, Vector3};
use crate::solver::linalg::{null_space, svd3};

use nalgebra::DMatrix;

pub type FundamentalSolver<'a, R> = MatrixSolver<'a, FundamentalSolverTrait, R>;

/// Rejects minimum sets whose design matrix has more than a one dimensional
/// null space.
const MIN_CONDITIONING: Number = 1e-8;

// chi-squared value (p=0.05, n=1)
const CHI_SQ_THRESHOLD: Number = 3.841;

/// Epipolar constraint `x_newᵀ · F · x_old = 0`.
pub struct FundamentalSolverTrait;

impl MatrixSolverTrait for FundamentalSolverTrait {
    #[inline]
    fn reverse_transform(mut transform_new: Matrix3) -> Matrix3 {
        transform_new.transpose_mut();
        transform_new
    }

    fn update_inliers(
        m_new_to_old: &Matrix3,
        old: &[Point2],
        new: &[Point2],
        sigma: Number,
    ) -> Consensus {
        let m_old_to_new = m_new_to_old.transpose();

        let inv_sigma_sq = 1.0 / (sigma * sigma);

        let mut is_inlier_match = vec![false; old.len()];
        let mut inlier_count = 0;
        let mut residual = 0.0;
        for (i, (old, new)) in old.iter().zip(new.iter()).enumerate() {
            // 1. Transform to homogeneous coordinates
            let point_old = old.to_homogeneous();
            let point_new = new.to_homogeneous();

            // 2. Compute symmetric transfer error
            let chi_sq_new =
                Self::solve_transfer_error(m_new_to_old, &point_old, &point_new, inv_sigma_sq);
            if !(chi_sq_new <= CHI_SQ_THRESHOLD) {
                continue;
            }
            let chi_sq_old =
                Self::solve_transfer_error(&m_old_to_new, &point_new, &point_old, inv_sigma_sq);
            if !(chi_sq_old <= CHI_SQ_THRESHOLD) {
                continue;
            }

            is_inlier_match[i] = true;
            inlier_count += 1;
            residual += chi_sq_new + chi_sq_old;
        }

        Consensus {
            is_inlier_match,
            inlier_count,
            residual,
        }
    }

    fn compute_m_new_to_old(old: &[Point2], new: &[Point2]) -> Option<Matrix3> {
        let num_points = old.len();

        let mut matrix_a = DMatrix::<Number>::zeros(num_points, 9);
        for (n_row, (old, new)) in old.iter().zip(new.iter()).enumerate() {
            let old = old.to_homogeneous().transpose();

            matrix_a.view_mut((n_row, 0), (1, 3)).copy_from(&(new.x * old));
            matrix_a.view_mut((n_row, 3), (1, 3)).copy_from(&(new.y * old));
            matrix_a.view_mut((n_row, 6), (1, 3)).copy_from(&old);
        }

        let null = null_space(&matrix_a)?;
        if null.conditioning() < MIN_CONDITIONING {
            return None;
        }
        let init_f_new_to_old = Matrix3::from_row_slice(null.vector.as_slice());

        // enforce rank 2
        let svd = svd3(&init_f_new_to_old)?;
        let mut lambda = svd.singular_values;
        lambda[2] = 0.0;

        Some(svd.u * Matrix3::from_diagonal(&lambda) * svd.v_t)
    }
}

impl FundamentalSolverTrait {
    /// Squared distance of `point_2` to the epipolar line of `point_1`,
    /// standardized by the keypoint noise.
    #[inline]
    pub fn solve_transfer_error(
        f_21: &Matrix3,
        point_1: &Vector3,
        point_2: &Vector3,
        inv_sigma_sq: Number,
    ) -> Number {
        // Transform a point in shot 1 to the epipolar line in shot 2,
        // then compute a transfer error (= dot product)
        let epiline_in_2 = f_21 * point_1;

        let residual_in_2 = epiline_in_2.dot(point_2);
        let line_norm_sq = epiline_in_2.x * epiline_in_2.x + epiline_in_2.y * epiline_in_2.y;
        if line_norm_sq <= Number::EPSILON {
            return Number::INFINITY;
        }
        let dist_sq_2 = residual_in_2 * residual_in_2 / line_norm_sq;

        // standardization
        dist_sq_2 * inv_sigma_sq
    }
}
