//! Schedule options — solver configuration, deadline and cancellation.
//!
//! Purpose
//! -------
//! Bundle everything that tunes a schedule optimization but is not part of
//! the scheduling problem itself: the L-BFGS configuration
//! ([`SolverOptions`]), an optional wall-clock budget and an optional
//! cancellation handle shared with the caller.
//!
//! Key behaviors
//! -------------
//! - [`ScheduleOptions::with_tolerance`] maps a single scalar tolerance onto
//!   the solver's gradient test: `tol_grad = max(tol · GRAD_TOL_SCALE,
//!   MIN_GRAD_TOL)` with a cap of [`DEFAULT_MAX_ITER`] iterations. The cost
//!   test keeps the solver's machine-epsilon default, so a run only stops
//!   early once the cost has genuinely stalled.
//! - [`default_tolerance`] picks the tolerance by horizon: tight for short
//!   horizons, looser once the per-evaluation cost becomes steep.
//! - [`CancelToken`] is a cloneable flag; the objective checks it before
//!   every cost evaluation, so a cancelled run stops within one evaluation.
//!
//! Invariants & assumptions
//! ------------------------
//! - Options are plain data; no field is read outside the optimizer call it
//!   is passed to.
//! - A timeout ends the run as non-converged; cancellation ends it with
//!   `ScheduleError::Cancelled`.
use crate::{
    optimization::cost_optimizer::{LineSearcher, SolverOptions, Tolerances},
    scheduling::errors::{ScheduleError, ScheduleResult},
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// Iteration cap applied by [`ScheduleOptions::with_tolerance`].
pub const DEFAULT_MAX_ITER: usize = 500;

/// Ratio between the scalar tolerance and the gradient-norm threshold.
pub const GRAD_TOL_SCALE: f64 = 1e-2;

/// Floor on the gradient-norm threshold.
pub const MIN_GRAD_TOL: f64 = 1e-10;

/// Tolerance used when the caller does not pick one.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Horizon from which [`default_tolerance`] switches to the loose setting.
pub const TIGHT_TOLERANCE_HORIZON: usize = 15;

/// Tolerance below [`TIGHT_TOLERANCE_HORIZON`] clients.
pub const TIGHT_TOLERANCE: f64 = 1e-6;

/// Tolerance for a horizon: [`TIGHT_TOLERANCE`] below
/// [`TIGHT_TOLERANCE_HORIZON`] clients, [`DEFAULT_TOLERANCE`] from there on.
pub fn default_tolerance(horizon: usize) -> f64 {
    if horizon < TIGHT_TOLERANCE_HORIZON { TIGHT_TOLERANCE } else { DEFAULT_TOLERANCE }
}

/// Gradient-driven stopping rules for a scalar `tol`.
fn solver_tolerances(tol: f64) -> Tolerances {
    Tolerances {
        tol_grad: Some((tol * GRAD_TOL_SCALE).max(MIN_GRAD_TOL)),
        tol_cost: None,
        max_iter: Some(DEFAULT_MAX_ITER),
    }
}

/// Shared cancellation flag.
///
/// Clones observe the same flag; cancelling any clone cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl PartialEq for CancelToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Configuration of one schedule optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleOptions {
    /// L-BFGS configuration (tolerances, line search, memory, verbosity).
    pub solver: SolverOptions,
    /// Wall-clock budget for the solver.
    pub timeout: Option<Duration>,
    /// Caller-held cancellation flag.
    pub cancel: Option<CancelToken>,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        ScheduleOptions {
            solver: SolverOptions {
                tols: solver_tolerances(DEFAULT_TOLERANCE),
                ..SolverOptions::default()
            },
            timeout: None,
            cancel: None,
        }
    }
}

impl ScheduleOptions {
    /// Options for a scalar `tol`, with the More–Thuente line search.
    ///
    /// # Errors
    /// `InvalidParameter { name: "tolerance", .. }` unless `tol` is finite
    /// and strictly positive.
    pub fn with_tolerance(tol: f64) -> ScheduleResult<Self> {
        if !(tol.is_finite() && tol > 0.0) {
            return Err(ScheduleError::InvalidParameter {
                name: "tolerance",
                value: tol,
                reason: "must be finite and strictly positive",
            });
        }
        let t = solver_tolerances(tol);
        let tols = Tolerances::new(t.tol_grad, t.tol_cost, t.max_iter)?;
        let solver = SolverOptions::new(tols, LineSearcher::MoreThuente, false, None)?;
        Ok(ScheduleOptions { solver, timeout: None, cancel: None })
    }

    /// Replace the solver configuration.
    pub fn solver(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }

    /// Cap the iteration count.
    pub fn max_iter(mut self, max_iter: usize) -> ScheduleResult<Self> {
        let t = self.solver.tols;
        self.solver.tols = Tolerances::new(t.tol_grad, t.tol_cost, Some(max_iter))?;
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Solver options with the schedule-level deadline folded in.
    pub(crate) fn effective_solver(&self) -> SolverOptions {
        match self.timeout {
            Some(timeout) => self.solver.clone().with_timeout(timeout),
            None => self.solver.clone(),
        }
    }
}
