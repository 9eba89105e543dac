//! Small dense linear solves.
//!
//! The logistic baseline solves one Newton system `H δ = g` per iteration,
//! where `H` is the (symmetric, positive definite) penalized Hessian. Systems
//! are tiny (one row per feature plus the intercept), so dense `nalgebra` is
//! plenty.
//!
//! - Cholesky first: exact and cheap for SPD matrices.
//! - SVD least squares as the fallback when the factorization fails (a
//!   numerically singular `H`, e.g. constant feature columns with a weak
//!   penalty). The SVD tolerance ladder is loosened until a finite solution
//!   appears.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = a.clone().svd(true, true);
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(x) = svd.solve(b, tol) {
            if x.iter().all(|v| v.is_finite()) {
                return Some(x);
            }
        }
    }
    None
}

/// Solve `h x = g` for a symmetric positive (semi-)definite `h`.
pub fn solve_spd(h: &DMatrix<f64>, g: &DVector<f64>) -> Option<DVector<f64>> {
    if let Some(chol) = h.clone().cholesky() {
        let x = chol.solve(g);
        if x.iter().all(|v| v.is_finite()) {
            return Some(x);
        }
    }
    tracing::debug!("Cholesky failed on a {}x{} system; falling back to SVD", h.nrows(), h.ncols());
    solve_least_squares(h, g)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_tall_system() {
        // y = 2 + 3x on x = [0, 1, 2]
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let b = DVector::from_row_slice(&[2.0, 5.0, 8.0]);
        let x = solve_least_squares(&a, &b).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-10);
        assert!((x[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn spd_solve_matches_known_solution() {
        let h = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let g = DVector::from_row_slice(&[1.0, 2.0]);
        let x = solve_spd(&h, &g).unwrap();
        assert!((x[0] - 1.0 / 11.0).abs() < 1e-12);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn singular_system_falls_back_to_minimum_norm() {
        let h = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let g = DVector::from_row_slice(&[2.0, 2.0]);
        let x = solve_spd(&h, &g).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-8);
        assert!((x[1] - 1.0).abs() < 1e-8);
    }
}
