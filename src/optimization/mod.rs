//! optimization — cost minimizer, numerical helpers, and unified error surface.
//!
//! Purpose
//! -------
//! Provide a cohesive optimization layer for schedule search, combining an
//! Argmin-backed cost minimizer, numerically stable reparameterizations and a
//! single error/result surface. Callers implement a cost, choose tolerances,
//! and obtain the minimizer and diagnostics without touching backend solver
//! details.
//!
//! Key behaviors
//! -------------
//! - Expose a high-level API for **minimizing costs** `c(θ)`
//!   (`cost_optimizer`), including configuration of solvers, stopping
//!   criteria and wall-clock limits.
//! - Supply shared numerical primitives (`numerical_stability`) for mapping
//!   unconstrained parameters onto non-negative decision variables.
//! - Normalize configuration issues, numerical failures, and backend solver
//!   errors into a single enum (`errors::OptError`) with a common result
//!   alias (`OptResult<T>`).
//!
//! Invariants & assumptions
//! ------------------------
//! - Optimizers operate in an unconstrained parameter space `θ` and assume
//!   that inputs are finite once validation has passed; invalid states are
//!   reported as `OptError`, not panics.
//! - Cost implementations treat domain violations and numerical breakdowns
//!   as recoverable errors. Domain errors raised inside a cost travel through
//!   the solver boxed in `OptError::Objective` and are unwrapped again by the
//!   scheduling layer.
//!
//! Conventions
//! -----------
//! - Parameters and gradients are `ndarray` aliases (`Theta`, `Grad`).
//! - Public optimization entrypoints that can fail return `OptResult<T>`;
//!   callers never see raw Argmin errors.
//! - This module avoids I/O. Solver progress is printed only when requested
//!   through `SolverOptions::verbose` with the `obs_slog` feature.
//!
//! Testing notes
//! -------------
//! - Unit tests in the submodules focus on local concerns: solver wiring,
//!   tolerance handling, transform accuracy and error conversions.
//! - End-to-end schedule solves live in `tests/`.

pub mod cost_optimizer;
pub mod errors;
pub mod numerical_stability;

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use adaptive_schedule::optimization::prelude::*;
//
// to import the main optimization surface in a single line.

pub mod prelude {
    pub use super::cost_optimizer::prelude::*;
    pub use super::errors::{OptError, OptResult};
    pub use super::numerical_stability::prelude::*;
}
