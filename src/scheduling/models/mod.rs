//! models — schedule optimization on top of `scheduling::core`.
//!
//! Purpose
//! -------
//! Connect the transient cost to the generic L-BFGS minimizer. The
//! [`ScheduleOptimizer`] fits the service model and assembles the chain once,
//! then minimizes over interarrival times in softplus-θ space.
//!
//! Downstream usage
//! ----------------
//! - One-shot callers use [`optimize_schedule`].
//! - Callers sweeping `ω` or the number of waiting clients for a fixed
//!   `(scv, elapsed, horizon)` build a [`ScheduleOptimizer`] and reuse it.

pub mod schedule;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::schedule::{
    ScheduleOptimizer, ScheduleOutcome, SchedulingProblem, ServiceChain, default_initial_guess,
    optimize_schedule,
};

pub mod prelude {
    pub use super::schedule::{ScheduleOptimizer, ScheduleOutcome, optimize_schedule};
}
