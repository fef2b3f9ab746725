//! Numerical stability utilities.
//!
//! Provides safe implementations of the transforms used to keep decision
//! variables non-negative while the optimizer works in unconstrained space.
//! Explicit cutoffs (`x > 20.0`, `x < -20.0`) keep `f64` arithmetic in a
//! well-conditioned regime.
//!
//! # Provided items
//! - [`MIN_INTERARRIVAL`]: floor applied to zero guesses before inversion.
//! - [`safe_softplus(x)`]: stable `ln(1 + exp(x))`, ℝ → (0, ∞).
//! - [`safe_softplus_inv(x)`]: inverse of softplus, (0, ∞) → ℝ.
//! - [`safe_logistic(x)`]: stable `1 / (1 + exp(-x))`, the derivative of
//!   softplus.

/// Smallest interarrival time mapped back into θ-space.
///
/// `softplus⁻¹(0)` is `-∞`; zero entries of an initial guess are lifted to
/// this floor so the optimizer starts from a finite point.
pub const MIN_INTERARRIVAL: f64 = 1e-8;

/// Numerically stable softplus: `softplus(x) = ln(1 + exp(x))`.
pub fn safe_softplus(x: f64) -> f64 {
    if x > 20.0 { x } else { x.exp().ln_1p() }
}

/// Stable inverse of softplus on `(0, ∞)`: returns `t = ln(exp(x) - 1)`.
///
/// `x` must be finite and `> 0`.
pub fn safe_softplus_inv(x: f64) -> f64 {
    if x > 20.0 { x } else { x.exp_m1().ln() }
}

/// Numerically stable logistic function `σ(x) = 1 / (1 + exp(-x))`.
///
/// This is `d softplus(x) / dx`, used to pull gradients from x-space back
/// into θ-space.
pub fn safe_logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
