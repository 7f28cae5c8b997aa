use crate::num::{Matrix3, Vector3};
use crate::slam3d::Pose;
use crate::solver::linalg::svd3;

/// The four algebraic solutions of an essential matrix, in the order
/// `(R1, t)`, `(R1, -t)`, `(R2, t)`, `(R2, -t)`.
pub type PoseCandidates = [Pose; 4];

/// `E = K_newᵀ · F · K_old`; both views share one camera here.
#[inline]
pub fn essential_from_fundamental(f_new_to_old: &Matrix3, cam_matrix: &Matrix3) -> Matrix3 {
    cam_matrix.transpose() * f_new_to_old * cam_matrix
}

/// https://en.wikipedia.org/wiki/Essential_matrix#Determining_R_and_t_from_E
pub fn decompose_essential(e_new_to_old: &Matrix3) -> Option<PoseCandidates> {
    let svd = svd3(e_new_to_old)?;
    let matrix_u = svd.u;
    let matrix_v_t = svd.v_t;

    let mut trans: Vector3 = matrix_u.column(2).into();
    if trans.norm() <= 0.0 {
        return None;
    }
    trans.normalize_mut();

    let mut matrix_w = Matrix3::zeros();
    matrix_w[(0, 1)] = -1.0;
    matrix_w[(1, 0)] = 1.0;
    matrix_w[(2, 2)] = 1.0;

    let mut rot_1 = matrix_u * matrix_w * matrix_v_t;
    if rot_1.determinant() < 0.0 {
        rot_1 *= -1.0;
    }

    let mut rot_2 = matrix_u * matrix_w.transpose() * matrix_v_t;
    if rot_2.determinant() < 0.0 {
        rot_2 *= -1.0;
    }

    Some([
        Pose::new(rot_1, trans),
        Pose::new(rot_1, -trans),
        Pose::new(rot_2, trans),
        Pose::new(rot_2, -trans),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::synthetic::Scene;

    use approx::assert_relative_eq;

    #[test]
    fn test_candidates_are_proper_rotations() {
        let scene = Scene::default_pair(10);
        let e = essential_from_fundamental(&scene.fundamental(), &scene.intrinsics.matrix());
        let candidates = decompose_essential(&e).unwrap();

        for candidate in candidates.iter() {
            let r = &candidate.rotation;
            assert_relative_eq!(r * r.transpose(), Matrix3::identity(), epsilon = 1e-9);
            assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-9);
            assert_relative_eq!(candidate.translation.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_ground_truth_is_among_candidates() {
        let scene = Scene::default_pair(10);
        let e = essential_from_fundamental(&scene.fundamental(), &scene.intrinsics.matrix());
        let candidates = decompose_essential(&e).unwrap();
        let t_dir = scene.translation.normalize();

        let found = candidates.iter().any(|c| {
            (c.rotation - scene.rotation).norm() < 1e-6 && (c.translation - t_dir).norm() < 1e-6
        });
        assert!(found);
    }
}
