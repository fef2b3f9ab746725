//! Errors for the scheduling engine (boundary validation, numerical failures,
//! and optimizer non-convergence).
//!
//! This module defines [`ScheduleError`], the single error type returned by
//! every public scheduling entrypoint, and [`Stage`], which names the pipeline
//! step (fit → assemble → invert → evaluate → optimize) where a failure was
//! detected. It implements `Display`/`Error` and converts to `PyErr` when the
//! `python-bindings` feature is enabled.
//!
//! ## Conventions
//! - Parameters are validated at the boundary before any matrix work, so an
//!   [`ScheduleError::InvalidParameter`] never carries a partially computed
//!   result.
//! - Numerical failures are reported, never converted into `NaN` costs.
//! - A solver that runs out of budget returns
//!   [`ScheduleError::OptimizationNonconvergence`] carrying the best point it
//!   saw, so callers can inspect it without mistaking it for an optimum.
#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*};

use crate::optimization::errors::OptError;
use ndarray::Array1;

/// Result alias for scheduling operations that may produce [`ScheduleError`].
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Pipeline step at which a failure was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Phase-type fit of the service distribution.
    Fit,
    /// Assembly of the joint generator `Sn`.
    Assemble,
    /// Dense inversion of `Sn`.
    Invert,
    /// Transient cost evaluation of a candidate schedule.
    Evaluate,
    /// Outer numerical minimization.
    Optimize,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Fit => "fit",
            Stage::Assemble => "assemble",
            Stage::Invert => "invert",
            Stage::Evaluate => "evaluate",
            Stage::Optimize => "optimize",
        };
        write!(f, "{name}")
    }
}

/// Unified error type for the scheduling engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleError {
    // ---- Boundary validation ----
    /// A caller-supplied parameter is outside its admissible range.
    InvalidParameter { name: &'static str, value: f64, reason: &'static str },

    /// A vector argument has the wrong length.
    LengthMismatch { name: &'static str, expected: usize, actual: usize },

    // ---- Numerical failures ----
    /// Singular or ill-conditioned matrix, overflow in `expm`, or a
    /// non-finite intermediate.
    NumericalInstability { stage: Stage, reason: String },

    // ---- Optimizer ----
    /// The solver exhausted its iteration or time budget before meeting its
    /// stopping criteria. `schedule`/`cost` hold the best point seen.
    OptimizationNonconvergence {
        status: String,
        iterations: usize,
        schedule: Array1<f64>,
        cost: f64,
    },

    /// The caller cancelled the run.
    Cancelled { stage: Stage },

    /// Any other solver-layer failure (backend errors, bad tolerances).
    Optimizer { stage: Stage, source: OptError },
}

impl std::error::Error for ScheduleError {}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::InvalidParameter { name, value, reason } => {
                write!(f, "Invalid parameter '{name}' = {value}: {reason}")
            }
            ScheduleError::LengthMismatch { name, expected, actual } => {
                write!(f, "Length mismatch for '{name}': expected {expected}, actual {actual}")
            }
            ScheduleError::NumericalInstability { stage, reason } => {
                write!(f, "Numerical instability during {stage}: {reason}")
            }
            ScheduleError::OptimizationNonconvergence { status, iterations, cost, .. } => {
                write!(
                    f,
                    "Optimizer did not converge after {iterations} iterations ({status}); \
                     best cost so far {cost}"
                )
            }
            ScheduleError::Cancelled { stage } => {
                write!(f, "Cancelled during {stage}")
            }
            ScheduleError::Optimizer { stage, source } => {
                write!(f, "Optimizer failure during {stage}: {source}")
            }
        }
    }
}

impl ScheduleError {
    /// Pipeline stage associated with this error, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ScheduleError::InvalidParameter { .. } | ScheduleError::LengthMismatch { .. } => None,
            ScheduleError::NumericalInstability { stage, .. }
            | ScheduleError::Cancelled { stage }
            | ScheduleError::Optimizer { stage, .. } => Some(*stage),
            ScheduleError::OptimizationNonconvergence { .. } => Some(Stage::Optimize),
        }
    }

    pub(crate) fn unstable(stage: Stage, reason: impl Into<String>) -> Self {
        ScheduleError::NumericalInstability { stage, reason: reason.into() }
    }
}

impl From<OptError> for ScheduleError {
    fn from(err: OptError) -> Self {
        match err {
            OptError::Objective(inner) => *inner,
            OptError::Cancelled => ScheduleError::Cancelled { stage: Stage::Optimize },
            other => ScheduleError::Optimizer { stage: Stage::Optimize, source: other },
        }
    }
}

#[cfg(feature = "python-bindings")]
impl From<ScheduleError> for PyErr {
    fn from(err: ScheduleError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
