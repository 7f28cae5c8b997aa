//! Optional refinement of one camera and its points by reprojection error.

use super::super::base::Solver;
use super::reprojection::reprojection_residual;
use crate::error::{BoxError, SolverError};
use crate::num::{Matrix3, Matrix3x4, Number, Point2, Vector3, Vector4};

use log::trace;
use nalgebra::{RowVector3, SMatrix, SVector};

type Matrix12 = SMatrix<Number, 12, 12>;
type Vector12 = SVector<Number, 12>;

const DEFAULT_ROUNDS: usize = 10;
const MIN_LAMBDA: Number = 1e-12;
const MAX_LAMBDA: Number = 1e8;

#[derive(Debug, Clone)]
pub struct Refined {
    pub projection: Matrix3x4,
    pub points: Vec<Vector4>,
}

/// Refines a projection matrix and homogeneous points against their
/// observations so that the total reprojection error drops.
pub trait BundleAdjuster: Send + Sync {
    fn refine(
        &self,
        projection: &Matrix3x4,
        points: &[Vector4],
        observed: &[Point2],
    ) -> Result<Refined, BoxError>;
}

/// Alternates a damped Gauss-Newton step on the twelve entries of the
/// projection matrix with one per point, keeping only steps that lower the
/// cost.
#[derive(Debug, Clone, Copy)]
pub struct AlternatingRefiner {
    pub rounds: usize,
}

impl AlternatingRefiner {
    pub fn new(rounds: usize) -> Self {
        Self { rounds }
    }
}

impl Default for AlternatingRefiner {
    fn default() -> Self {
        Self::new(DEFAULT_ROUNDS)
    }
}

impl BundleAdjuster for AlternatingRefiner {
    fn refine(
        &self,
        projection: &Matrix3x4,
        points: &[Vector4],
        observed: &[Point2],
    ) -> Result<Refined, BoxError> {
        if points.len() != observed.len() {
            return Err(Box::new(SolverError::LengthMismatch {
                left: points.len(),
                right: observed.len(),
            }));
        }
        Ok(Refinement {
            projection: *projection,
            points: points.to_vec(),
            observed,
        }
        .solve(self.rounds))
    }
}

struct Refinement<'a> {
    projection: Matrix3x4,
    points: Vec<Vector4>,
    observed: &'a [Point2],
}

impl<'a> Solver<Refined> for Refinement<'a> {
    const MAX_ITER: usize = DEFAULT_ROUNDS;

    fn solve(mut self, repeat: usize) -> Refined {
        let mut lambda = 1e-3;
        let mut cost = total_cost(&self.projection, &self.points, self.observed);

        for round in 0..repeat {
            // 1. camera, points fixed
            if let Some(candidate) =
                camera_step(&self.projection, &self.points, self.observed, lambda)
            {
                let candidate_cost = total_cost(&candidate, &self.points, self.observed);
                if candidate_cost < cost {
                    self.projection = candidate;
                    cost = candidate_cost;
                    lambda = (lambda * 0.1).max(MIN_LAMBDA);
                } else {
                    lambda = (lambda * 10.0).min(MAX_LAMBDA);
                }
            }

            // 2. points, camera fixed
            for (point, observed) in self.points.iter_mut().zip(self.observed.iter()) {
                point_step(&self.projection, point, observed);
            }

            let new_cost = total_cost(&self.projection, &self.points, self.observed);
            trace!("refinement round {}: cost {} -> {}", round, cost, new_cost);
            let converged = cost - new_cost <= 1e-12 * cost.max(1.0);
            cost = new_cost;
            if converged {
                break;
            }
        }

        Refined {
            projection: self.projection,
            points: self.points,
        }
    }
}

fn total_cost(projection: &Matrix3x4, points: &[Vector4], observed: &[Point2]) -> Number {
    points
        .iter()
        .zip(observed.iter())
        .map(|(point, observed)| reprojection_residual(projection, point, observed).norm_squared())
        .sum()
}

fn camera_step(
    projection: &Matrix3x4,
    points: &[Vector4],
    observed: &[Point2],
    lambda: Number,
) -> Option<Matrix3x4> {
    let mut jtj = Matrix12::zeros();
    let mut jtr = Vector12::zeros();

    for (point, observed) in points.iter().zip(observed.iter()) {
        let projected = projection * point;
        if projected.z.abs() <= Number::EPSILON {
            continue;
        }
        let inv_z = 1.0 / projected.z;
        let u = projected.x * inv_z;
        let v = projected.y * inv_z;

        // parameters are the rows of P, stacked
        let mut j_u = Vector12::zeros();
        let mut j_v = Vector12::zeros();
        j_u.fixed_rows_mut::<4>(0).copy_from(&(point * inv_z));
        j_u.fixed_rows_mut::<4>(8).copy_from(&(point * (-u * inv_z)));
        j_v.fixed_rows_mut::<4>(4).copy_from(&(point * inv_z));
        j_v.fixed_rows_mut::<4>(8).copy_from(&(point * (-v * inv_z)));

        jtj += j_u * j_u.transpose() + j_v * j_v.transpose();
        jtr += j_u * (observed.x - u) + j_v * (observed.y - v);
    }

    let mut damped = jtj;
    for i in 0..12 {
        damped[(i, i)] += lambda * (jtj[(i, i)] + 1e-9);
    }
    let delta = damped.cholesky()?.solve(&jtr);

    let candidate = projection + Matrix3x4::from_row_slice(delta.as_slice());
    // the scale of P is free; keep the caller's
    let scale = projection.norm() / candidate.norm();
    if !scale.is_finite() {
        return None;
    }
    Some(candidate * scale)
}

fn point_step(projection: &Matrix3x4, point: &mut Vector4, observed: &Point2) {
    let before = reprojection_residual(projection, point, observed).norm_squared();
    if !before.is_finite() || point.w == 0.0 {
        return;
    }

    let m: Matrix3 = projection.fixed_view::<3, 3>(0, 0).into_owned();
    let position: Vector3 = point.xyz() / point.w;
    let projected = m * position + projection.column(3);
    if projected.z.abs() <= Number::EPSILON {
        return;
    }
    let inv_z = 1.0 / projected.z;
    let u = projected.x * inv_z;
    let v = projected.y * inv_z;

    let j_u: RowVector3<Number> = (m.row(0) - m.row(2) * u) * inv_z;
    let j_v: RowVector3<Number> = (m.row(1) - m.row(2) * v) * inv_z;
    let jtj = j_u.transpose() * j_u + j_v.transpose() * j_v;
    let jtr = j_u.transpose() * (observed.x - u) + j_v.transpose() * (observed.y - v);

    let mut damped = jtj;
    for i in 0..3 {
        damped[(i, i)] += 1e-6 * (jtj[(i, i)] + 1e-12);
    }
    let delta = match damped.cholesky() {
        Some(cholesky) => cholesky.solve(&jtr),
        None => return,
    };

    let candidate = (position + delta).push(1.0);
    let after = reprojection_residual(projection, &candidate, observed).norm_squared();
    if after < before {
        *point = candidate;
    }
}
