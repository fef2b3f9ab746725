//! cost_optimizer — argmin-powered minimizer for smooth scalar costs.
//!
//! Purpose
//! -------
//! Provide a high-level, Argmin-backed optimization layer for **minimizing**
//! a cost `c(θ)` over an unconstrained parameter vector. Callers implement a
//! single trait, [`CostObjective`], and invoke [`minimize`] to run L-BFGS with
//! a configurable line search, tolerances, timeout and finite-difference
//! fallbacks.
//!
//! Key behaviors
//! -------------
//! - Convert user objectives into Argmin-compatible cost functions via
//!   [`adapter::ArgMinAdapter`].
//! - Expose a single entrypoint [`minimize`] that:
//!   - validates the initial guess and calls [`CostObjective::check`],
//!   - selects an L-BFGS solver via [`builders`] based on [`traits::LineSearcher`],
//!   - executes the solver via [`run::run_lbfgs`], and
//!   - normalizes results into an [`OptimOutcome`].
//! - Fall back to finite differences ([`finite_diff`]) when an objective
//!   provides no analytic gradient.
//!
//! Invariants & assumptions
//! ------------------------
//! - [`CostObjective::value`] and [`CostObjective::grad`] report invalid
//!   inputs as recoverable [`OptError`](crate::optimization::errors::OptError)
//!   values, not panics.
//! - [`OptimOutcome::converged`] is `true` only when the solver met its own
//!   stopping rule; iteration caps and timeouts are reported as
//!   non-converged.
//!
//! Conventions
//! -----------
//! - Parameters live in an unconstrained space as [`Theta`]
//!   (`Array1<f64>`). Mapping constrained quantities (e.g. non-negative
//!   interarrival times) into that space happens in the model layer.
//! - This module performs no logging of its own; progress output is opt-in
//!   through `SolverOptions::verbose` and the `obs_slog` feature.
//!
//! Testing notes
//! -------------
//! - Unit tests cover adapter gradients, tolerance wiring, outcome
//!   classification and a convex end-to-end solve; schedule-level solves are
//!   tested in `scheduling::models` and the integration suite.

pub mod adapter;
pub mod api;
pub mod builders;
pub mod finite_diff;
pub mod run;
pub mod traits;
pub mod types;
pub mod validation;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::api::minimize;
pub use self::traits::{CostObjective, LineSearcher, OptimOutcome, SolverOptions, Tolerances};
pub use self::types::{Cost, DEFAULT_LBFGS_MEM, FnEvalMap, Grad, Theta};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::api::minimize;
    pub use super::traits::{CostObjective, LineSearcher, OptimOutcome, SolverOptions, Tolerances};
    pub use super::types::{Cost, Grad, Theta};
}
