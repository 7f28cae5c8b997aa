use std::cmp::Ordering;
use std::marker::PhantomData;

use super::super::base::Solver;
use super::super::common::{is_collinear, normalize};
use crate::config::{MIN_SET_SIZE, RANSAC_ITERATIONS};
use crate::error::SolverError;
use crate::num::{Matrix3, Number, Point2};

use itertools::Itertools;
use log::{debug, warn};
use rand::Rng;
use rayon::prelude::*;

pub trait MatrixSolverTrait: Send + Sync {
    /// Map the transform of the new image into the one that undoes the
    /// normalization of an estimated matrix.
    fn reverse_transform(transform_new: Matrix3) -> Matrix3;

    /// Classify every correspondence against `m_new_to_old`.
    fn update_inliers(
        m_new_to_old: &Matrix3,
        old: &[Point2],
        new: &[Point2],
        sigma: Number,
    ) -> Consensus;

    /// Fit a matrix to normalized correspondences, `None` for degenerate sets.
    fn compute_m_new_to_old(old: &[Point2], new: &[Point2]) -> Option<Matrix3>;
}

/// RANSAC over index-aligned correspondences: `old[i]` matches `new[i]`.
pub struct MatrixSolver<'a, T, R>
where
    T: MatrixSolverTrait,
{
    pub solver: PhantomData<T>,

    pub old: &'a [Point2],
    pub new: &'a [Point2],

    pub sigma: Number,
    pub min_inliers: usize,

    pub rng: &'a mut R,
}

#[derive(Debug, Clone)]
pub struct Consensus {
    pub is_inlier_match: Vec<bool>,
    pub inlier_count: usize,
    /// Sum of the standardized errors of the inliers.
    pub residual: Number,
}

#[derive(Debug, Clone)]
pub struct MatrixResult {
    pub best_m_new_to_old: Matrix3,
    pub consensus: Consensus,
}

struct Hypothesis {
    index: usize,
    m_new_to_old: Matrix3,
    consensus: Consensus,
}

impl<'a, T, R> MatrixSolver<'a, T, R>
where
    T: MatrixSolverTrait,
    R: Rng + Send + Sync,
{
    pub fn new(old: &'a [Point2], new: &'a [Point2], sigma: Number, rng: &'a mut R) -> Self {
        Self {
            solver: PhantomData,
            old,
            new,
            sigma,
            min_inliers: MIN_SET_SIZE,
            rng,
        }
    }

    pub fn with_min_inliers(mut self, min_inliers: usize) -> Self {
        self.min_inliers = min_inliers.max(MIN_SET_SIZE);
        self
    }
}

impl<'a, T, R> Solver<Result<MatrixResult, SolverError>> for MatrixSolver<'a, T, R>
where
    T: MatrixSolverTrait,
    R: Rng + Send + Sync,
{
    const MAX_ITER: usize = RANSAC_ITERATIONS;

    fn solve(self, repeat: usize) -> Result<MatrixResult, SolverError> {
        let Self {
            old,
            new,
            sigma,
            min_inliers,
            rng,
            ..
        } = self;

        let num_matches = old.len();
        if num_matches != new.len() {
            return Err(SolverError::LengthMismatch {
                left: num_matches,
                right: new.len(),
            });
        }
        if num_matches < MIN_SET_SIZE {
            return Err(SolverError::InsufficientMatches {
                found: num_matches,
                required: MIN_SET_SIZE,
            });
        }
        let degenerate = |inliers| SolverError::DegenerateGeometry {
            inliers,
            required: min_inliers,
        };
        if is_collinear(old) || is_collinear(new) {
            return Err(degenerate(0));
        }

        // 0. Normalize keypoint coordinates
        let (normalized_old, transform_old) = normalize(old);
        let (normalized_new, transform_new) = normalize(new);
        let transform_new_inv = T::reverse_transform(transform_new);

        // 1. Draw every minimum set up front so the outcome only depends on the rng
        let min_sets = (0..repeat)
            .map(|_| rand::seq::index::sample(&mut *rng, num_matches, MIN_SET_SIZE).into_vec())
            .collect_vec();

        // 2. Score hypotheses in parallel
        let best = min_sets
            .into_par_iter()
            .enumerate()
            .filter_map(|(index, min_set)| {
                let min_set_old = min_set.iter().map(|&i| normalized_old[i]).collect_vec();
                let min_set_new = min_set.iter().map(|&i| normalized_new[i]).collect_vec();

                let normalized_m_new_to_old = T::compute_m_new_to_old(&min_set_old, &min_set_new)?;
                let m_new_to_old = transform_new_inv * normalized_m_new_to_old * transform_old;
                let consensus = T::update_inliers(&m_new_to_old, old, new, sigma);
                Some(Hypothesis {
                    index,
                    m_new_to_old,
                    consensus,
                })
            })
            .reduce_with(|a, b| match compare(&a, &b) {
                Ordering::Greater | Ordering::Equal => a,
                Ordering::Less => b,
            });

        let best = match best {
            Some(best) if best.consensus.inlier_count >= min_inliers => best,
            Some(best) => return Err(degenerate(best.consensus.inlier_count)),
            None => return Err(degenerate(0)),
        };
        debug!(
            "ransac: hypothesis {} kept with {}/{} inliers",
            best.index, best.consensus.inlier_count, num_matches
        );

        // 3. Recompute a matrix only with the inlier matches
        let (inlier_old, inlier_new): (Vec<_>, Vec<_>) = best
            .consensus
            .is_inlier_match
            .iter()
            .enumerate()
            .filter(|(_, is_inlier)| **is_inlier)
            .map(|(i, _)| (normalized_old[i], normalized_new[i]))
            .unzip();

        let refit = T::compute_m_new_to_old(&inlier_old, &inlier_new).map(|normalized| {
            let m_new_to_old = transform_new_inv * normalized * transform_old;
            let consensus = T::update_inliers(&m_new_to_old, old, new, sigma);
            (m_new_to_old, consensus)
        });

        let (best_m_new_to_old, consensus) = match refit {
            Some((m, consensus)) if consensus.inlier_count >= best.consensus.inlier_count => {
                (m, consensus)
            }
            _ => {
                warn!("refit on all inliers lost support, keeping the sampled model");
                (best.m_new_to_old, best.consensus)
            }
        };

        Ok(MatrixResult {
            best_m_new_to_old,
            consensus,
        })
    }
}

/// More inliers first, then lower residual, then the earlier hypothesis.
fn compare(a: &Hypothesis, b: &Hypothesis) -> Ordering {
    a.consensus
        .inlier_count
        .cmp(&b.consensus.inlier_count)
        .then_with(|| b.consensus.residual.total_cmp(&a.consensus.residual))
        .then_with(|| b.index.cmp(&a.index))
}
