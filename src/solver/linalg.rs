//! Singular value decompositions used by the solvers.
//!
//! The pure-Rust nalgebra backend is the default. Building with the `lapack`
//! feature routes every decomposition through `nalgebra-lapack` (Intel MKL).

use crate::num::{Matrix3, Number, Vector3};

use nalgebra::{DMatrix, DVector};

/// `m = u * diag(singular_values) * v_t`, singular values in descending order.
#[derive(Debug, Clone)]
pub struct Svd3 {
    pub u: Matrix3,
    pub singular_values: Vector3,
    pub v_t: Matrix3,
}

/// Right singular vector of the smallest singular value.
#[derive(Debug, Clone)]
pub struct NullSpace {
    pub vector: DVector<Number>,
    /// All singular values, descending.
    pub singular_values: Vec<Number>,
}

impl NullSpace {
    /// Ratio of the second smallest to the largest singular value.
    ///
    /// Close to zero when the null space has more than one dimension.
    pub fn conditioning(&self) -> Number {
        let n = self.singular_values.len();
        if n < 2 || self.singular_values[0] <= 0.0 {
            return 0.0;
        }
        self.singular_values[n - 2] / self.singular_values[0]
    }
}

pub fn svd3(m: &Matrix3) -> Option<Svd3> {
    let (u, singular_values, v_t) = svd3_unordered(m)?;

    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| singular_values[b].total_cmp(&singular_values[a]));

    let mut sorted = Svd3 {
        u: Matrix3::zeros(),
        singular_values: Vector3::zeros(),
        v_t: Matrix3::zeros(),
    };
    for (dst, &src) in order.iter().enumerate() {
        sorted.u.set_column(dst, &u.column(src));
        sorted.singular_values[dst] = singular_values[src];
        sorted.v_t.set_row(dst, &v_t.row(src));
    }
    Some(sorted)
}

/// Solve `a * x = 0` in the least-squares sense with `|x| = 1`.
pub fn null_space(a: &DMatrix<Number>) -> Option<NullSpace> {
    let cols = a.ncols();
    if cols == 0 {
        return None;
    }
    // zero rows leave the null space untouched but give a full V
    let a = if a.nrows() < cols {
        a.clone().resize_vertically(cols, 0.0)
    } else {
        a.clone()
    };

    let (singular_values, v_t) = dyn_svd(a)?;
    let smallest = singular_values.imin();
    let vector = v_t.row(smallest).transpose();

    let mut singular_values = singular_values.iter().copied().collect::<Vec<_>>();
    singular_values.sort_by(|a, b| b.total_cmp(a));

    if vector.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(NullSpace {
        vector,
        singular_values,
    })
}

#[cfg(not(feature = "lapack"))]
fn svd3_unordered(m: &Matrix3) -> Option<(Matrix3, Vector3, Matrix3)> {
    let svd = nalgebra::SVD::new(*m, true, true);
    Some((svd.u?, svd.singular_values, svd.v_t?))
}

#[cfg(feature = "lapack")]
fn svd3_unordered(m: &Matrix3) -> Option<(Matrix3, Vector3, Matrix3)> {
    let svd = nalgebra_lapack::SVD::new(*m)?;
    Some((svd.u, svd.singular_values, svd.vt))
}

#[cfg(not(feature = "lapack"))]
fn dyn_svd(a: DMatrix<Number>) -> Option<(DVector<Number>, DMatrix<Number>)> {
    let svd = nalgebra::SVD::new(a, false, true);
    Some((svd.singular_values, svd.v_t?))
}

#[cfg(feature = "lapack")]
fn dyn_svd(a: DMatrix<Number>) -> Option<(DVector<Number>, DMatrix<Number>)> {
    let svd = nalgebra_lapack::SVD::new(a)?;
    Some((svd.singular_values, svd.vt))
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn test_svd3_reconstructs_sorted() {
        let m = Matrix3::new(2.0, -1.0, 0.5, 0.3, 4.0, 1.0, -2.0, 0.0, 0.1);
        let svd = svd3(&m).unwrap();
        assert!(svd.singular_values[0] >= svd.singular_values[1]);
        assert!(svd.singular_values[1] >= svd.singular_values[2]);

        let back = svd.u * Matrix3::from_diagonal(&svd.singular_values) * svd.v_t;
        assert_relative_eq!(back, m, epsilon = 1e-10);
    }

    #[test]
    fn test_null_space_of_short_matrix() {
        // two equations in three unknowns: the null space is spanned by (1, 1, 1)
        let a = DMatrix::from_row_slice(2, 3, &[1.0, -1.0, 0.0, 0.0, 1.0, -1.0]);
        let null = null_space(&a).unwrap();
        assert_eq!(null.vector.len(), 3);
        assert_relative_eq!((&a * &null.vector).norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(null.vector.norm(), 1.0, epsilon = 1e-12);
    }
}
