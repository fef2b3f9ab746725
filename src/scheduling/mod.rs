//! scheduling — adaptive appointment schedules for a single server.
//!
//! Purpose
//! -------
//! Compute interarrival times for the next clients of a single-server system
//! that minimize a weighted sum of expected server idle time and expected
//! client waiting time. Service times are modeled by a phase-type
//! distribution matched to a mean and squared coefficient of variation, and
//! the schedule adapts to the current state: clients already waiting and
//! service time already received by the client in service.
//!
//! Key behaviors
//! -------------
//! - [`core`] fits the phase-type model, assembles the joint chain and
//!   evaluates the transient cost with an adjoint gradient.
//! - [`models`] minimizes that cost with L-BFGS over softplus-θ.
//! - [`plan`] converts a request in real time units into an appointment
//!   table (interarrival and arrival times).
//! - [`lookup`] serves plans from a bucketed in-memory table of precomputed
//!   schedules.
//! - [`errors`] defines [`ScheduleError`] with the pipeline [`Stage`] at
//!   which a failure occurred.
//!
//! Invariants & assumptions
//! ------------------------
//! - Inputs are validated once at the boundary (`mean > 0`, `scv > 0`,
//!   `elapsed ≥ 0`, `0 < ω < 1`, `wis < horizon`); inner layers assume valid
//!   input and only guard against numerical breakdown.
//! - Every returned schedule is non-negative and finite.
//!
//! Conventions
//! -----------
//! - Inner layers work in units of the mean service time; [`plan`] rescales.
//! - Diagnostic output goes through `tracing` at `debug`/`trace` level; the
//!   stack never installs a subscriber.
//!
//! Downstream usage
//! ----------------
//! ```rust,no_run
//! use adaptive_schedule::scheduling::prelude::*;
//!
//! let request = ScheduleRequest {
//!     mean: 12.0,
//!     scv: 0.6,
//!     omega: 0.5,
//!     clients: 5,
//!     waiting_in_system: 1,
//!     elapsed: 4.0,
//! };
//! let plan = plan_appointments(&request, &request.default_options()?)?;
//! for (client, gap, arrival) in plan.rows() {
//!     println!("{client}: +{gap:.2} -> {arrival:.2}");
//! }
//! # Ok::<(), ScheduleError>(())
//! ```

pub mod core;
pub mod errors;
pub mod lookup;
pub mod models;
pub mod plan;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::core::{CancelToken, PhaseTypeModel, ScheduleOptions, fit_service_distribution};
pub use self::errors::{ScheduleError, ScheduleResult, Stage};
pub use self::lookup::{ScheduleCache, ScheduleKey};
pub use self::models::{ScheduleOptimizer, ScheduleOutcome, optimize_schedule};
pub use self::plan::{AppointmentPlan, ScheduleRequest, plan_appointments, plan_with};

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use adaptive_schedule::scheduling::prelude::*;
//
// to import the main scheduling surface in a single line.

pub mod prelude {
    pub use super::{
        AppointmentPlan, CancelToken, PhaseTypeModel, ScheduleCache, ScheduleError, ScheduleKey,
        ScheduleOptimizer, ScheduleOptions, ScheduleOutcome, ScheduleRequest, ScheduleResult,
        Stage, fit_service_distribution, optimize_schedule, plan_appointments, plan_with,
    };
}
