//! Noise-free two-camera scenes for tests.

use crate::camera::Intrinsics;
use crate::num::{Matrix3, Matrix3x4, Number, Point2, Point3, Vector3};
use crate::slam3d::Pose;

use nalgebra::Rotation3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct Scene {
    pub intrinsics: Intrinsics,
    /// Motion from the first camera to the second: `x_2 = R · x_1 + t`.
    pub rotation: Matrix3,
    pub translation: Vector3,
    /// Points in the first camera's frame.
    pub points: Vec<Point3>,
    pub pts1: Vec<Point2>,
    pub pts2: Vec<Point2>,
}

impl Scene {
    pub fn new(
        intrinsics: Intrinsics,
        rotation: Matrix3,
        translation: Vector3,
        points: Vec<Point3>,
    ) -> Self {
        let pts1 = points
            .iter()
            .map(|p| project(&intrinsics, &p.coords))
            .collect();
        let pts2 = points
            .iter()
            .map(|p| project(&intrinsics, &(rotation * p.coords + translation)))
            .collect();
        Self {
            intrinsics,
            rotation,
            translation,
            points,
            pts1,
            pts2,
        }
    }

    /// A sideways step with a slight turn in front of a box of points.
    pub fn default_pair(num_points: usize) -> Self {
        Self::new(
            default_intrinsics(),
            Rotation3::from_euler_angles(0.02, -0.08, 0.03).into_inner(),
            Vector3::new(-1.0, 0.1, 0.05),
            box_points(num_points, 7),
        )
    }

    pub fn relative_pose(&self) -> Pose {
        Pose::new(self.rotation, self.translation)
    }

    /// Ground truth `F` with `x_2ᵀ · F · x_1 = 0`.
    pub fn fundamental(&self) -> Matrix3 {
        let k_inv = self.intrinsics.matrix().try_inverse().unwrap();
        k_inv.transpose() * self.translation.cross_matrix() * self.rotation * k_inv
    }

    pub fn projection_1(&self) -> Matrix3x4 {
        Pose::identity().projection(&self.intrinsics.matrix())
    }

    pub fn projection_2(&self) -> Matrix3x4 {
        self.relative_pose().projection(&self.intrinsics.matrix())
    }
}

pub fn default_intrinsics() -> Intrinsics {
    Intrinsics::new(800.0, 800.0, 320.0, 240.0).unwrap()
}

/// Points spread over a box 4 to 8 units in front of the origin.
pub fn box_points(num_points: usize, seed: u64) -> Vec<Point3> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..num_points)
        .map(|_| {
            Point3::new(
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-1.5..1.5),
                rng.gen_range(4.0..8.0),
            )
        })
        .collect()
}

pub fn project(intrinsics: &Intrinsics, point: &Vector3) -> Point2 {
    let normalized = Point2::new(point.x / point.z, point.y / point.z);
    intrinsics.project(&normalized)
}

/// Angle between two directions, radians.
pub fn angle_between(a: &Vector3, b: &Vector3) -> Number {
    a.normalize().dot(&b.normalize()).clamp(-1.0, 1.0).acos()
}
