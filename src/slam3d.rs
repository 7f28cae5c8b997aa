//! Camera poses and their accumulation along the image sequence.

use crate::num::{Matrix3, Matrix3x4, Vector3};
use crate::solver::linalg::svd3;

use serde::{Deserialize, Serialize};

/// A rotation and translation; either the motion between two adjacent
/// frames or a frame's pose relative to the first one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rotation: Matrix3,
    pub translation: Vector3,
}

impl Pose {
    #[inline]
    pub fn new(rotation: Matrix3, translation: Vector3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    #[inline]
    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    /// Compose a relative motion onto this pose.
    ///
    /// The rotation is applied first and the translation is expressed in
    /// this pose's basis: `R = R_rel · R`, `t = t + R · t_rel`.
    pub fn chain(&self, relative: &Pose) -> Pose {
        let rotation = orthonormalize(&(relative.rotation * self.rotation));
        let translation = self.translation + self.rotation * relative.translation;
        Pose::new(rotation, translation)
    }

    /// `[R | t]`
    pub fn extrinsic(&self) -> Matrix3x4 {
        let mut rt = Matrix3x4::zeros();
        rt.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        rt.set_column(3, &self.translation);
        rt
    }

    /// `K · [R | t]`
    #[inline]
    pub fn projection(&self, cam_matrix: &Matrix3) -> Matrix3x4 {
        cam_matrix * self.extrinsic()
    }
}

/// Running global pose of the most recent frame and its projection matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    pub pose: Pose,
    pub projection: Matrix3x4,
}

impl ChainState {
    /// The first frame sits at the world origin.
    pub fn origin(cam_matrix: &Matrix3) -> Self {
        let pose = Pose::identity();
        Self {
            projection: pose.projection(cam_matrix),
            pose,
        }
    }

    pub fn chain(&self, relative: &Pose, cam_matrix: &Matrix3) -> Self {
        let pose = self.pose.chain(relative);
        Self {
            projection: pose.projection(cam_matrix),
            pose,
        }
    }
}

/// Closest rotation in the Frobenius sense.
pub fn orthonormalize(rotation: &Matrix3) -> Matrix3 {
    let svd = match svd3(rotation) {
        Some(svd) => svd,
        None => return *rotation,
    };
    let mut u = svd.u;
    if (u * svd.v_t).determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    u * svd.v_t
}
