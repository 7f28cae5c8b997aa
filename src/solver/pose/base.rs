use super::triangulate::{dehomogenize, Triangulator};
use crate::camera::Intrinsics;
use crate::config::PoseConfig;
use crate::error::SolverError;
use crate::num::{Matrix3, Number, Point2};
use crate::slam3d::Pose;
use crate::solver::base::Solver;
use crate::solver::matrix::{decompose_essential, PoseCandidates};

use itertools::Itertools;
use log::debug;

/// Homogeneous coordinates at or below this are points at infinity.
const SAMPLE_EPSILON: Number = 1e-12;

/// Outcome of the cheirality check over the four essential candidates.
#[derive(Debug, Clone)]
pub struct RecoveredPose {
    /// Motion from the old camera to the new one, `|t| = 1`.
    pub pose: Pose,
    /// Sampled points in front of both cameras under `pose`.
    pub valid: usize,
    pub samples: usize,
    /// Valid counts per candidate, in candidate order.
    pub scores: [usize; 4],
}

/// Pick the essential-matrix candidate that places the most sampled points in
/// front of both cameras.
pub fn recover_pose(
    e_new_to_old: &Matrix3,
    intrinsics: &Intrinsics,
    pts_old: &[Point2],
    pts_new: &[Point2],
    config: &PoseConfig,
) -> Result<RecoveredPose, SolverError> {
    if pts_old.len() != pts_new.len() {
        return Err(SolverError::LengthMismatch {
            left: pts_old.len(),
            right: pts_new.len(),
        });
    }

    let candidates: PoseCandidates =
        decompose_essential(e_new_to_old).ok_or(SolverError::AmbiguousPose {
            best: 0,
            runner_up: 0,
        })?;

    let sample_indices = sample_indices(pts_old.len(), config.sample_points);
    let samples_old = sample_indices
        .iter()
        .map(|&i| intrinsics.unproject(&pts_old[i]))
        .collect_vec();
    let samples_new = sample_indices
        .iter()
        .map(|&i| intrinsics.unproject(&pts_new[i]))
        .collect_vec();

    let mut scores = [0usize; 4];
    for (score, candidate) in scores.iter_mut().zip(candidates.iter()) {
        *score = count_in_front(candidate, &samples_old, &samples_new, config.max_depth);
    }
    debug!("cheirality scores {:?} over {} samples", scores, sample_indices.len());

    // the earliest candidate wins a tie for the best score
    let best = scores
        .iter()
        .enumerate()
        .fold(0, |best, (i, &score)| if score > scores[best] { i } else { best });
    let runner_up = scores
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != best)
        .map(|(_, &score)| score)
        .max()
        .unwrap_or(0);

    let required = ((config.min_valid_ratio * sample_indices.len() as Number).ceil() as usize).max(1);
    if scores[best] < required || scores[best] == runner_up {
        return Err(SolverError::AmbiguousPose {
            best: scores[best],
            runner_up,
        });
    }

    Ok(RecoveredPose {
        pose: candidates[best],
        valid: scores[best],
        samples: sample_indices.len(),
        scores,
    })
}

/// Evenly strided subset of `0..len`, everything when `limit` is 0 or large enough.
fn sample_indices(len: usize, limit: usize) -> Vec<usize> {
    if limit == 0 || limit >= len {
        return (0..len).collect();
    }
    (0..limit).map(|i| i * len / limit).collect()
}

/// Points on the normalized image planes of `[I | 0]` and `[R | t]` that
/// triangulate in front of both cameras (and closer than `max_depth`, if set).
fn count_in_front(
    candidate: &Pose,
    samples_old: &[Point2],
    samples_new: &[Point2],
    max_depth: Option<Number>,
) -> usize {
    let max_depth = max_depth.unwrap_or(Number::INFINITY);
    let projection_old = Pose::identity().extrinsic();
    let projection_new = candidate.extrinsic();

    samples_old
        .iter()
        .zip(samples_new.iter())
        .filter(|&(point_old, point_new)| {
            let homogeneous = match (Triangulator {
                projection_old: &projection_old,
                projection_new: &projection_new,
                point_old,
                point_new,
            })
            .solve_to_end()
            {
                Some(homogeneous) => homogeneous,
                None => return false,
            };
            let point = match dehomogenize(&homogeneous, SAMPLE_EPSILON) {
                Some(point) => point.xyz(),
                None => return false,
            };

            let depth_old = point.z;
            let depth_new = (candidate.rotation * point + candidate.translation).z;
            depth_old > 0.0 && depth_new > 0.0 && depth_old < max_depth && depth_new < max_depth
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::num::Vector3;
    use crate::solver::matrix::essential_from_fundamental;
    use crate::solver::synthetic::{angle_between, box_points, default_intrinsics, Scene};

    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    #[test]
    fn test_recovers_ground_truth_pose() {
        let scene = Scene::default_pair(40);
        let e = essential_from_fundamental(&scene.fundamental(), &scene.intrinsics.matrix());

        let recovered = recover_pose(
            &e,
            &scene.intrinsics,
            &scene.pts1,
            &scene.pts2,
            &PoseConfig::default(),
        )
        .unwrap();

        assert_relative_eq!(recovered.pose.rotation, scene.rotation, epsilon = 1e-6);
        assert!(angle_between(&recovered.pose.translation, &scene.translation) < 1e-6);
        assert_relative_eq!(recovered.pose.translation.norm(), 1.0, epsilon = 1e-12);
        assert_eq!(recovered.valid, 40);
        assert_eq!(recovered.scores.iter().filter(|&&s| s == 40).count(), 1);
    }

    #[test]
    fn test_sample_subset() {
        let scene = Scene::default_pair(30);
        let e = essential_from_fundamental(&scene.fundamental(), &scene.intrinsics.matrix());
        let config = PoseConfig {
            sample_points: 10,
            ..PoseConfig::default()
        };

        let recovered =
            recover_pose(&e, &scene.intrinsics, &scene.pts1, &scene.pts2, &config).unwrap();
        assert_eq!(recovered.samples, 10);
        assert_eq!(recovered.valid, 10);
    }

    #[test]
    fn test_points_beyond_max_depth_are_ambiguous() {
        let scene = Scene::default_pair(20);
        let e = essential_from_fundamental(&scene.fundamental(), &scene.intrinsics.matrix());
        // every point is several baselines away
        let config = PoseConfig {
            max_depth: Some(1.0),
            ..PoseConfig::default()
        };

        let err = recover_pose(&e, &scene.intrinsics, &scene.pts1, &scene.pts2, &config)
            .unwrap_err();
        assert!(matches!(err, SolverError::AmbiguousPose { .. }));
    }

    #[test]
    fn test_small_baseline_far_scene() {
        // points sit roughly 70 to 130 baselines away
        let scene = Scene::new(
            default_intrinsics(),
            Rotation3::from_euler_angles(0.0, 0.01, 0.0).into_inner(),
            Vector3::new(-0.06, 0.0, 0.0),
            box_points(60, 7),
        );
        let e = essential_from_fundamental(&scene.fundamental(), &scene.intrinsics.matrix());

        let recovered = recover_pose(
            &e,
            &scene.intrinsics,
            &scene.pts1,
            &scene.pts2,
            &PoseConfig::default(),
        )
        .unwrap();

        assert_eq!(recovered.valid, 60);
        assert_relative_eq!(recovered.pose.rotation, scene.rotation, epsilon = 1e-6);
        assert!(angle_between(&recovered.pose.translation, &scene.translation) < 1e-6);
    }

    #[test]
    fn test_sample_indices() {
        assert_eq!(sample_indices(5, 0), vec![0, 1, 2, 3, 4]);
        assert_eq!(sample_indices(5, 10), vec![0, 1, 2, 3, 4]);
        assert_eq!(sample_indices(10, 5), vec![0, 2, 4, 6, 8]);
    }
}
