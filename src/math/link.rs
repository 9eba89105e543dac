//! Logistic link functions.
//!
//! Numerical notes:
//! - `sigmoid` branches on the sign of `z` so that `exp` is only ever taken of a
//!   non-positive argument and cannot overflow.
//! - `log_loss` clamps probabilities away from 0 and 1.

/// Clamp used by [`logit`] and [`log_loss`].
const P_EPS: f64 = 1e-15;

/// `1 / (1 + e^-z)` without overflow for large `|z|`.
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Inverse of [`sigmoid`]; `p` is clamped into `(0, 1)`.
pub fn logit(p: f64) -> f64 {
    let p = p.clamp(P_EPS, 1.0 - P_EPS);
    (p / (1.0 - p)).ln()
}

/// Binary cross-entropy of one observation.
pub fn log_loss(y: u8, p: f64) -> f64 {
    let p = p.clamp(P_EPS, 1.0 - P_EPS);
    if y == 1 { -p.ln() } else { -(1.0 - p).ln() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_is_symmetric_and_saturates() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!((sigmoid(2.0) + sigmoid(-2.0) - 1.0).abs() < 1e-15);
        assert_eq!(sigmoid(1000.0), 1.0);
        assert_eq!(sigmoid(-1000.0), 0.0);
    }

    #[test]
    fn logit_inverts_sigmoid() {
        for z in [-5.0, -0.3, 0.0, 1.7, 4.0] {
            assert!((logit(sigmoid(z)) - z).abs() < 1e-9);
        }
    }

    #[test]
    fn log_loss_is_finite_at_the_edges() {
        assert!(log_loss(1, 0.0).is_finite());
        assert!(log_loss(0, 1.0).is_finite());
        assert!(log_loss(1, 0.9) < log_loss(1, 0.1));
    }
}
