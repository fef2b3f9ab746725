//! scheduling::core — phase-type fit, joint chain, transient cost.
//!
//! Purpose
//! -------
//! Hold the numerical building blocks of appointment scheduling: input
//! validation, service moments, the phase-type fit with its residual start
//! vector, the block generator over (phase × clients served), the forward
//! probability state, and the transient cost with its adjoint gradient.
//!
//! Key behaviors
//! -------------
//! - [`fit_service_distribution`] maps `(mean, scv, elapsed)` to a
//!   [`PhaseTypeModel`] (weighted Erlang, exponential or hyperexponential).
//! - [`assemble_chain`] builds `Sn` and its checked dense inverse once.
//! - [`TransientCostEvaluator`] evaluates the expected weighted idle plus
//!   waiting time of a schedule, optionally with `∂c/∂x`.
//! - [`ScheduleOptions`] carries solver tolerances, a deadline and a
//!   cancellation token.
//!
//! Invariants & assumptions
//! ------------------------
//! - Everything here is in units of the mean service time once the model is
//!   fitted with mean 1.
//! - Dense linear algebra goes through [`linalg`], which owns the residual
//!   and finiteness checks.
//!
//! Testing notes
//! -------------
//! - Each submodule carries unit tests against closed forms (exponential and
//!   Erlang-2 costs, moment matching) and finite-difference gradients.

pub mod chain;
pub mod cost;
pub mod linalg;
pub mod moments;
pub mod options;
pub mod phase_type;
pub mod state;
pub mod validation;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::chain::{JointChain, assemble_chain};
pub use self::cost::{TransientCostEvaluator, evaluate_cost};
pub use self::moments::ServiceMoments;
pub use self::options::{CancelToken, ScheduleOptions, default_tolerance};
pub use self::phase_type::{PhaseTypeModel, fit_moments, fit_service_distribution};
pub use self::state::ProbabilityState;
pub use self::validation::{
    validate_elapsed, validate_horizon, validate_interarrivals, validate_mean, validate_omega,
    validate_scv,
};

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use adaptive_schedule::scheduling::core::prelude::*;
//
// to import the core scheduling surface in a single line.

pub mod prelude {
    pub use super::chain::{JointChain, assemble_chain};
    pub use super::cost::{TransientCostEvaluator, evaluate_cost};
    pub use super::moments::ServiceMoments;
    pub use super::options::{CancelToken, ScheduleOptions};
    pub use super::phase_type::{PhaseTypeModel, fit_service_distribution};
}
