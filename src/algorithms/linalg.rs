//! Small fixed-size linear algebra used by the fusion pipeline
//!
//! Everything the estimators need from a matrix library goes through these
//! pure functions: symmetric 3x3 inversion with a conditioning guard,
//! closed-form 2x2 eigenvalues, a general symmetric 3x3 eigen-solve and
//! frame rotation.

use nalgebra::{Matrix2, Matrix3, SymmetricEigen};

/// Eigenvalue ratio (smallest / largest magnitude) below which a symmetric
/// 3x3 system is treated as singular
pub const SINGULARITY_TOLERANCE: f64 = 1e-14;

/// Average the matrix with its transpose
pub fn symmetrize(m: &Matrix3<f64>) -> Matrix3<f64> {
    (m + m.transpose()) * 0.5
}

/// True when every entry is finite
pub fn is_finite(m: &Matrix3<f64>) -> bool {
    m.iter().all(|v| v.is_finite())
}

/// Invert a symmetric 3x3 matrix.
///
/// Returns `None` when the matrix is zero, when its smallest eigenvalue is
/// negligible next to its largest, or when the inverse contains non-finite
/// entries.
pub fn invert_symmetric3(m: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    if !is_finite(m) {
        return None;
    }
    let m = symmetrize(m);
    let eigenvalues = SymmetricEigen::new(m).eigenvalues;
    let largest = eigenvalues.amax();
    let smallest = eigenvalues.amin();
    if largest == 0.0 || smallest <= SINGULARITY_TOLERANCE * largest {
        return None;
    }
    let inverse = symmetrize(&m.try_inverse()?);
    if is_finite(&inverse) {
        Some(inverse)
    } else {
        None
    }
}

/// Eigenvalues `(largest, smallest)` of a symmetric 2x2 matrix from its
/// trace and determinant.
pub fn eigenvalues_symmetric2(m: &Matrix2<f64>) -> (f64, f64) {
    let trace = m[(0, 0)] + m[(1, 1)];
    let det = m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)];
    let half = 0.5 * trace;
    // Clamped: rounding can push the discriminant slightly negative
    let disc = (half * half - det).max(0.0).sqrt();
    (half + disc, half - disc)
}

/// Largest eigenvalue of a symmetric 3x3 matrix
pub fn max_eigenvalue_symmetric3(m: &Matrix3<f64>) -> f64 {
    SymmetricEigen::new(symmetrize(m)).eigenvalues.max()
}

/// `r * m * rᵀ`, i.e. express `m` in the frame whose basis vectors are the
/// columns of `r`.
pub fn rotate(r: &Matrix3<f64>, m: &Matrix3<f64>) -> Matrix3<f64> {
    symmetrize(&(r * m * r.transpose()))
}

/// `rᵀ * m * r`, the inverse of [`rotate`] for orthonormal `r`.
pub fn rotate_back(r: &Matrix3<f64>, m: &Matrix3<f64>) -> Matrix3<f64> {
    symmetrize(&(r.transpose() * m * r))
}

/// Horizontal (upper-left) 2x2 block
pub fn horizontal_block(m: &Matrix3<f64>) -> Matrix2<f64> {
    m.fixed_view::<2, 2>(0, 0).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_invert_diagonal() {
        let m = Matrix3::from_diagonal(&nalgebra::Vector3::new(2.0, 4.0, 8.0));
        let inv = invert_symmetric3(&m).unwrap();
        assert_relative_eq!(inv[(0, 0)], 0.5);
        assert_relative_eq!(inv[(1, 1)], 0.25);
        assert_relative_eq!(inv[(2, 2)], 0.125);
    }

    #[test]
    fn test_singular_detection() {
        // rank 2
        let m = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0);
        assert!(invert_symmetric3(&m).is_none());
        assert!(invert_symmetric3(&Matrix3::zeros()).is_none());

        // nearly singular relative to its scale
        let m = Matrix3::new(1e6, 0.0, 0.0, 0.0, 1e6, 0.0, 0.0, 0.0, 1e-12);
        assert!(invert_symmetric3(&m).is_none());

        let mut m = Matrix3::identity();
        m[(1, 2)] = f64::NAN;
        assert!(invert_symmetric3(&m).is_none());
    }

    #[test]
    fn test_eigenvalues_2x2() {
        let m = Matrix2::new(3.0, 1.0, 1.0, 3.0);
        let (big, small) = eigenvalues_symmetric2(&m);
        assert_relative_eq!(big, 4.0, epsilon = 1e-12);
        assert_relative_eq!(small, 2.0, epsilon = 1e-12);

        let (big, small) = eigenvalues_symmetric2(&Matrix2::identity());
        assert_relative_eq!(big, 1.0);
        assert_relative_eq!(small, 1.0);
    }

    #[test]
    fn test_max_eigenvalue_3x3() {
        let m = Matrix3::new(2.0, 1.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.0, 1.5);
        assert_relative_eq!(max_eigenvalue_symmetric3(&m), 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_rotation_round_trip() {
        let angle: f64 = 0.3;
        let r = Matrix3::new(
            angle.cos(), -angle.sin(), 0.0,
            angle.sin(), angle.cos(), 0.0,
            0.0, 0.0, 1.0,
        );
        let m = Matrix3::new(4.0, 1.0, 0.5, 1.0, 3.0, 0.2, 0.5, 0.2, 2.0);
        let back = rotate_back(&r, &rotate(&r, &m));
        for (a, b) in back.iter().zip(m.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }
}
