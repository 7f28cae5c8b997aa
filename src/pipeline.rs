//! Incremental two-view reconstruction over an ordered image sequence.
//!
//! Every frame of the configured camera is matched against the one before
//! it, the relative motion is chained onto the running global pose and the
//! inliers are triangulated into one growing point cloud. A failing pair
//! ends the sequence: the reconstruction moves to [`Phase::Done`] and later
//! frames are rejected, so a broken link is never bridged.

use std::mem;

use crate::camera::Intrinsics;
use crate::cloud::PointCloud;
use crate::config::ReconstructionConfig;
use crate::dataset::Frame;
use crate::error::{ReconstructionError, SolverError, Stage};
use crate::feature::{FeatureExtractor, Features};
use crate::matcher::{match_features, Correspondences};
use crate::num::{Matrix3, Vector2, Vector4};
use crate::slam3d::{ChainState, Pose};
use crate::solver::{
    essential_from_fundamental, recover_pose, reprojection_residuals, triangulate_points,
    AlternatingRefiner, BundleAdjuster, FundamentalSolver, ResidualSummary, Solver,
};

use log::{debug, info};
use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No frame of the configured camera seen yet.
    Init,
    /// A frame is being matched against the previous one.
    Matching,
    /// At least one pair has been committed.
    Accumulating,
    /// Finished or aborted; no more frames are accepted.
    Done,
}

/// Everything one pairwise step produces, before it is committed.
#[derive(Debug, Clone)]
pub struct PairResult {
    pub state: ChainState,
    pub relative: Pose,
    pub fundamental: Matrix3,
    pub essential: Matrix3,
    pub matches: usize,
    pub inliers: Correspondences,
    pub cheirality_valid: usize,
    pub points: Vec<Vector4>,
    pub residuals: Vec<Vector2>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairReport {
    pub previous: String,
    pub current: String,
    pub matches: usize,
    pub inliers: usize,
    pub cheirality_valid: usize,
    pub fundamental: Matrix3,
    pub essential: Matrix3,
    pub relative: Pose,
    pub global: Pose,
    pub points: usize,
    pub reprojection: ResidualSummary,
}

#[derive(Debug, Clone, Default)]
pub struct ReconstructionOutput {
    pub cloud: PointCloud,
    pub pairs: Vec<PairReport>,
}

/// Match, estimate, recover, chain and triangulate one pair of frames.
///
/// `state` is the global pose of the previous frame; it is not modified.
pub fn reconstruct_pair<R>(
    state: &ChainState,
    previous: &Features,
    current: &Features,
    intrinsics: &Intrinsics,
    config: &ReconstructionConfig,
    rng: &mut R,
) -> Result<PairResult, (Stage, SolverError)>
where
    R: Rng + Send + Sync,
{
    let cam_matrix = intrinsics.matrix();

    let matches =
        match_features(previous, current, &config.matcher).map_err(|e| (Stage::Matching, e))?;

    let estimate = FundamentalSolver::new(&matches.pts1, &matches.pts2, config.ransac.sigma, rng)
        .with_min_inliers(config.ransac.min_inliers)
        .solve(config.ransac.iterations)
        .map_err(|e| (Stage::Geometry, e))?;
    let fundamental = estimate.best_m_new_to_old;
    let inliers = matches.filter(&estimate.consensus.is_inlier_match);
    debug!("F =\n{}", fundamental);

    let essential = essential_from_fundamental(&fundamental, &cam_matrix);
    let recovered = recover_pose(
        &essential,
        intrinsics,
        &inliers.pts1,
        &inliers.pts2,
        &config.pose,
    )
    .map_err(|e| (Stage::Pose, e))?;
    debug!(
        "E =\n{}R =\n{}t = {}",
        essential, recovered.pose.rotation, recovered.pose.translation
    );

    let next = state.chain(&recovered.pose, &cam_matrix);
    debug!("P =\n{}", next.projection);

    let points = triangulate_points(
        &state.projection,
        &next.projection,
        &inliers.pts1,
        &inliers.pts2,
        config.triangulation_epsilon,
    )
    .map_err(|e| (Stage::Triangulation, e))?;
    let residuals = reprojection_residuals(&next.projection, &points, &inliers.pts2)
        .map_err(|e| (Stage::Triangulation, e))?;

    Ok(PairResult {
        state: next,
        relative: recovered.pose,
        fundamental,
        essential,
        matches: matches.len(),
        inliers,
        cheirality_valid: recovered.valid,
        points,
        residuals,
    })
}

/// Owns the running global pose and the point cloud; frames are fed in order.
pub struct Reconstruction<E, R> {
    extractor: E,
    intrinsics: Intrinsics,
    config: ReconstructionConfig,
    rng: R,
    adjuster: Box<dyn BundleAdjuster>,

    phase: Phase,
    previous: Option<(Frame, Features)>,
    state: ChainState,
    cloud: PointCloud,
    pairs: Vec<PairReport>,
}

impl<E, R> Reconstruction<E, R>
where
    E: FeatureExtractor,
    R: Rng + Send + Sync,
{
    pub fn new(extractor: E, intrinsics: Intrinsics, config: ReconstructionConfig, rng: R) -> Self {
        let adjuster = Box::new(AlternatingRefiner::new(config.bundle_adjustment.iterations));
        Self {
            extractor,
            state: ChainState::origin(&intrinsics.matrix()),
            intrinsics,
            config,
            rng,
            adjuster,
            phase: Phase::Init,
            previous: None,
            cloud: PointCloud::new(),
            pairs: Vec::new(),
        }
    }

    /// Replace the refiner used when bundle adjustment is enabled.
    pub fn with_bundle_adjuster(mut self, adjuster: impl BundleAdjuster + 'static) -> Self {
        self.adjuster = Box::new(adjuster);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Global pose and projection of the last committed frame.
    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    pub fn pairs(&self) -> &[PairReport] {
        &self.pairs
    }

    /// Feed the next frame of the sequence.
    ///
    /// Frames of other cameras are ignored. Returns the report of the pair
    /// that was committed, if any. A pair or refinement failure leaves pose
    /// and cloud as they were and moves to [`Phase::Done`].
    pub fn push(&mut self, frame: &Frame) -> Result<Option<&PairReport>, ReconstructionError> {
        if self.phase == Phase::Done {
            return Err(ReconstructionError::Finished);
        }
        if frame.camera_id != self.config.camera_id {
            debug!("skipping {} (camera {})", frame.name, frame.camera_id);
            return Ok(None);
        }

        let features =
            self.extractor
                .extract(frame)
                .map_err(|source| ReconstructionError::Extraction {
                    frame: frame.name.clone(),
                    source: Box::new(source),
                })?;

        let (previous_frame, previous_features) = match self.previous.take() {
            Some(previous) => previous,
            None => {
                info!("{}: {} keypoints, first frame", frame.name, features.len());
                self.state = ChainState::origin(&self.intrinsics.matrix());
                self.previous = Some((frame.clone(), features));
                self.phase = Phase::Matching;
                return Ok(None);
            }
        };
        self.phase = Phase::Matching;

        let result = reconstruct_pair(
            &self.state,
            &previous_features,
            &features,
            &self.intrinsics,
            &self.config,
            &mut self.rng,
        );
        let mut result = match result {
            Ok(result) => result,
            Err((stage, source)) => {
                return Err(self.abort(ReconstructionError::Pair {
                    previous: previous_frame.name,
                    current: frame.name.clone(),
                    stage,
                    source,
                }));
            }
        };

        if self.config.bundle_adjustment.enabled {
            let refined = self
                .adjuster
                .refine(&result.state.projection, &result.points, &result.inliers.pts2)
                .and_then(|refined| {
                    let residuals = reprojection_residuals(
                        &refined.projection,
                        &refined.points,
                        &result.inliers.pts2,
                    )?;
                    Ok((refined, residuals))
                });
            match refined {
                Ok((refined, residuals)) => {
                    result.state.projection = refined.projection;
                    result.points = refined.points;
                    result.residuals = residuals;
                }
                Err(source) => {
                    return Err(self.abort(ReconstructionError::Refinement {
                        frame: frame.name.clone(),
                        source,
                    }));
                }
            }
        }

        let reprojection = ResidualSummary::from_residuals(&result.residuals);
        info!(
            "{} -> {}: {} matches, {} inliers, {} points, mean reprojection error {:.4}px",
            previous_frame.name,
            frame.name,
            result.matches,
            result.inliers.len(),
            result.points.len(),
            reprojection.mean,
        );

        let report = PairReport {
            previous: previous_frame.name,
            current: frame.name.clone(),
            matches: result.matches,
            inliers: result.inliers.len(),
            cheirality_valid: result.cheirality_valid,
            fundamental: result.fundamental,
            essential: result.essential,
            relative: result.relative,
            global: result.state.pose,
            points: result.points.len(),
            reprojection,
        };

        // commit
        self.state = result.state;
        self.cloud.extend(result.points);
        self.previous = Some((frame.clone(), features));
        self.pairs.push(report);
        self.phase = Phase::Accumulating;
        Ok(self.pairs.last())
    }

    fn abort(&mut self, err: ReconstructionError) -> ReconstructionError {
        self.phase = Phase::Done;
        self.previous = None;
        err
    }

    /// Close the sequence and hand out everything accumulated so far.
    pub fn finish(&mut self) -> ReconstructionOutput {
        self.phase = Phase::Done;
        self.previous = None;
        ReconstructionOutput {
            cloud: mem::take(&mut self.cloud),
            pairs: mem::take(&mut self.pairs),
        }
    }

    pub fn run<'a>(
        mut self,
        frames: impl IntoIterator<Item = &'a Frame>,
    ) -> Result<ReconstructionOutput, ReconstructionError> {
        for frame in frames {
            self.push(frame)?;
        }
        let output = self.finish();
        info!(
            "reconstructed {} points from {} pairs",
            output.cloud.len(),
            output.pairs.len()
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BoxError, DatasetError};
    use crate::num::Matrix3x4;
    use crate::solver::synthetic::{angle_between, Scene};
    use crate::solver::Refined;

    use std::collections::HashMap;
    use std::path::PathBuf;

    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    impl FeatureExtractor for HashMap<String, Features> {
        type Error = DatasetError;

        fn extract(&self, frame: &Frame) -> Result<Features, DatasetError> {
            self.get(&frame.name)
                .cloned()
                .ok_or_else(|| DatasetError::UnknownImage(frame.name.clone()))
        }
    }

    /// One distinct descriptor per scene point.
    fn features(points: &[crate::num::Point2]) -> Features {
        let descriptors = (0..points.len()).map(|i| vec![i as f32 * 10.0, 1.0]).collect();
        Features::new(points.to_vec(), descriptors).unwrap()
    }

    fn frame(name: &str, camera_id: u32) -> Frame {
        Frame {
            name: name.to_string(),
            path: PathBuf::from(name),
            camera_id,
        }
    }

    fn pair_extractor(scene: &Scene) -> HashMap<String, Features> {
        let mut map = HashMap::new();
        map.insert("a.png".to_string(), features(&scene.pts1));
        map.insert("b.png".to_string(), features(&scene.pts2));
        map
    }

    #[test]
    fn test_single_pair_step() {
        let scene = Scene::default_pair(40);
        let cam_matrix = scene.intrinsics.matrix();
        let mut rng = StdRng::seed_from_u64(3);

        let result = reconstruct_pair(
            &ChainState::origin(&cam_matrix),
            &features(&scene.pts1),
            &features(&scene.pts2),
            &scene.intrinsics,
            &ReconstructionConfig::default(),
            &mut rng,
        )
        .unwrap();

        assert_eq!(result.matches, 40);
        assert_eq!(result.inliers.len(), 40);
        assert_relative_eq!(result.state.pose.rotation, scene.rotation, epsilon = 1e-6);
        assert!(angle_between(&result.state.pose.translation, &scene.translation) < 1e-6);

        // unit baseline: the cloud is the scene shrunk by |t|
        let scale = scene.translation.norm();
        for (point, truth) in result.points.iter().zip(scene.points.iter()) {
            assert_relative_eq!(point.xyz() * scale, truth.coords, epsilon = 1e-4);
        }
        assert!(ResidualSummary::from_residuals(&result.residuals).max < 1e-4);
    }

    #[test]
    fn test_run_filters_cameras() {
        let scene = Scene::default_pair(30);
        let frames = vec![frame("a.png", 1), frame("other.png", 2), frame("b.png", 1)];

        let output = Reconstruction::new(
            pair_extractor(&scene),
            scene.intrinsics,
            ReconstructionConfig::default(),
            StdRng::seed_from_u64(5),
        )
        .run(&frames)
        .unwrap();

        assert_eq!(output.pairs.len(), 1);
        assert_eq!(output.pairs[0].previous, "a.png");
        assert_eq!(output.pairs[0].current, "b.png");
        assert_eq!(output.cloud.len(), 30);
    }

    #[test]
    fn test_phases() {
        let scene = Scene::default_pair(30);
        let mut reconstruction = Reconstruction::new(
            pair_extractor(&scene),
            scene.intrinsics,
            ReconstructionConfig::default(),
            StdRng::seed_from_u64(5),
        );
        assert_eq!(reconstruction.phase(), Phase::Init);

        assert!(reconstruction.push(&frame("a.png", 1)).unwrap().is_none());
        assert_eq!(reconstruction.phase(), Phase::Matching);

        let report = reconstruction.push(&frame("b.png", 1)).unwrap().unwrap();
        assert_eq!(report.points, 30);
        assert_eq!(reconstruction.phase(), Phase::Accumulating);

        let output = reconstruction.finish();
        assert_eq!(output.cloud.len(), 30);
        assert_eq!(reconstruction.phase(), Phase::Done);
        assert!(matches!(
            reconstruction.push(&frame("b.png", 1)),
            Err(ReconstructionError::Finished)
        ));
    }

    #[test]
    fn test_failed_pair_ends_the_sequence() {
        let scene = Scene::default_pair(30);
        let mut extractor = pair_extractor(&scene);
        extractor.insert("c.png".to_string(), features(&scene.pts2[..5]));

        let mut reconstruction = Reconstruction::new(
            extractor,
            scene.intrinsics,
            ReconstructionConfig::default(),
            StdRng::seed_from_u64(5),
        );
        reconstruction.push(&frame("a.png", 1)).unwrap();
        let before = *reconstruction.state();

        let err = reconstruction.push(&frame("c.png", 1)).unwrap_err();
        match &err {
            ReconstructionError::Pair {
                previous,
                current,
                stage,
                source,
            } => {
                assert_eq!(previous, "a.png");
                assert_eq!(current, "c.png");
                assert_eq!(*stage, Stage::Matching);
                assert!(matches!(
                    source,
                    SolverError::InsufficientMatches { required: 8, .. }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(*reconstruction.state(), before);
        assert!(reconstruction.cloud().is_empty());

        // a.png -> b.png would skip the failed frame
        assert_eq!(reconstruction.phase(), Phase::Done);
        assert!(matches!(
            reconstruction.push(&frame("b.png", 1)),
            Err(ReconstructionError::Finished)
        ));
        assert!(reconstruction.pairs().is_empty());
    }

    #[test]
    fn test_extraction_failure_is_reported() {
        let scene = Scene::default_pair(10);
        let mut reconstruction = Reconstruction::new(
            pair_extractor(&scene),
            scene.intrinsics,
            ReconstructionConfig::default(),
            StdRng::seed_from_u64(5),
        );

        let err = reconstruction.push(&frame("missing.png", 1)).unwrap_err();
        assert!(matches!(err, ReconstructionError::Extraction { .. }));
        assert!(err.solver_error().is_none());
    }

    #[test]
    fn test_bundle_adjustment_keeps_exact_input() {
        let scene = Scene::default_pair(30);
        let mut config = ReconstructionConfig::default();
        config.bundle_adjustment.enabled = true;

        let output = Reconstruction::new(
            pair_extractor(&scene),
            scene.intrinsics,
            config,
            StdRng::seed_from_u64(5),
        )
        .run(&[frame("a.png", 1), frame("b.png", 1)])
        .unwrap();

        assert_eq!(output.cloud.len(), 30);
        assert!(output.pairs[0].reprojection.max < 1e-4);
    }

    /// Returns the input projection with only every other point.
    struct DropsPoints;

    impl BundleAdjuster for DropsPoints {
        fn refine(
            &self,
            projection: &Matrix3x4,
            points: &[Vector4],
            _observed: &[crate::num::Point2],
        ) -> Result<Refined, BoxError> {
            Ok(Refined {
                projection: *projection,
                points: points.iter().step_by(2).copied().collect(),
            })
        }
    }

    #[test]
    fn test_refined_point_count_must_match() {
        let scene = Scene::default_pair(30);
        let mut config = ReconstructionConfig::default();
        config.bundle_adjustment.enabled = true;

        let mut reconstruction = Reconstruction::new(
            pair_extractor(&scene),
            scene.intrinsics,
            config,
            StdRng::seed_from_u64(5),
        )
        .with_bundle_adjuster(DropsPoints);
        reconstruction.push(&frame("a.png", 1)).unwrap();

        let err = reconstruction.push(&frame("b.png", 1)).unwrap_err();
        match &err {
            ReconstructionError::Refinement { frame, source } => {
                assert_eq!(frame, "b.png");
                assert!(matches!(
                    source.downcast_ref::<SolverError>(),
                    Some(SolverError::LengthMismatch {
                        left: 15,
                        right: 30
                    })
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(reconstruction.cloud().is_empty());
        assert!(reconstruction.pairs().is_empty());
        assert_eq!(reconstruction.phase(), Phase::Done);
    }
}
