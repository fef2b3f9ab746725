//! numerical_stability — stable transforms between θ-space and x ≥ 0.
//!
//! Purpose
//! -------
//! Collect the scalar transforms used to keep interarrival times
//! non-negative while the optimizer works on an unconstrained vector. The
//! schedule model maps `x = softplus(θ)` and pulls gradients back with the
//! logistic function, so both directions must stay finite across the whole
//! real line.
//!
//! Invariants & assumptions
//! ------------------------
//! - Transforms assume finite `f64` inputs; `safe_softplus_inv` additionally
//!   assumes a strictly positive argument. Callers lift zeros to
//!   [`MIN_INTERARRIVAL`] first.
//! - This module never logs or touches global state.
//!
//! Testing notes
//! -------------
//! - Unit tests in [`transformations`] cover round trips on a positive grid,
//!   agreement of the logistic with the numerical softplus slope, and tail
//!   behavior.

pub mod transformations;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::transformations::{
    MIN_INTERARRIVAL, safe_logistic, safe_softplus, safe_softplus_inv,
};

pub mod prelude {
    pub use super::transformations::{
        MIN_INTERARRIVAL, safe_logistic, safe_softplus, safe_softplus_inv,
    };
}
