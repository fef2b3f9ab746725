//! Boundary checks for scheduling parameters.
//!
//! Purpose
//! -------
//! Centralize the small validation routines every public scheduling entry
//! point runs before touching a matrix, so bad input fails fast with a
//! structured [`ScheduleError::InvalidParameter`] or
//! [`ScheduleError::LengthMismatch`] instead of surfacing later as a
//! singular matrix or a `NaN` cost.
//!
//! Invariants & assumptions
//! ------------------------
//! - Mean and SCV must be finite and strictly positive.
//! - Elapsed service time must be finite and non-negative.
//! - ω must lie strictly inside `(0, 1)`.
//! - The horizon is at least one client and the number of clients already
//!   waiting is strictly below it.
//! - Interarrival vectors are finite, non-negative and of the expected
//!   length.
//!
//! Conventions
//! -----------
//! - Every helper returns the validated value (or `()`) so call sites can
//!   bind it directly with `?`.
//! - No logging; the caller decides whether a rejected request is notable.
use crate::scheduling::errors::{ScheduleError, ScheduleResult};
use ndarray::ArrayView1;

/// Validate the service-time mean.
///
/// # Errors
/// `InvalidParameter { name: "mean", .. }` if `mean` is NaN, infinite or
/// `<= 0`.
pub fn validate_mean(mean: f64) -> ScheduleResult<f64> {
    positive_finite("mean", mean)
}

/// Validate the squared coefficient of variation of the service time.
///
/// # Errors
/// `InvalidParameter { name: "scv", .. }` if `scv` is NaN, infinite or
/// `<= 0`.
pub fn validate_scv(scv: f64) -> ScheduleResult<f64> {
    positive_finite("scv", scv)
}

/// Validate the elapsed service time of the client currently in service.
pub fn validate_elapsed(elapsed: f64) -> ScheduleResult<f64> {
    if !elapsed.is_finite() {
        return Err(ScheduleError::InvalidParameter {
            name: "elapsed",
            value: elapsed,
            reason: "must be finite",
        });
    }
    if elapsed < 0.0 {
        return Err(ScheduleError::InvalidParameter {
            name: "elapsed",
            value: elapsed,
            reason: "must be non-negative",
        });
    }
    Ok(elapsed)
}

/// Validate the idle-time weight ω.
///
/// ω weighs expected idle time, `1 - ω` weighs expected waiting time; both
/// endpoints are excluded.
pub fn validate_omega(omega: f64) -> ScheduleResult<f64> {
    if !(omega.is_finite() && omega > 0.0 && omega < 1.0) {
        return Err(ScheduleError::InvalidParameter {
            name: "omega",
            value: omega,
            reason: "must lie strictly between 0 and 1",
        });
    }
    Ok(omega)
}

/// Validate the scheduling horizon together with the number of clients
/// already waiting.
///
/// # Errors
/// - `InvalidParameter { name: "horizon", .. }` if `horizon == 0`.
/// - `InvalidParameter { name: "waiting_in_system", .. }` if
///   `wis >= horizon`.
pub fn validate_horizon(horizon: usize, wis: usize) -> ScheduleResult<()> {
    if horizon == 0 {
        return Err(ScheduleError::InvalidParameter {
            name: "horizon",
            value: 0.0,
            reason: "must be at least 1",
        });
    }
    if wis >= horizon {
        return Err(ScheduleError::InvalidParameter {
            name: "waiting_in_system",
            value: wis as f64,
            reason: "must be strictly smaller than the horizon",
        });
    }
    Ok(())
}

/// Validate a vector of interarrival times against its expected length.
///
/// # Errors
/// - `LengthMismatch { name, .. }` when `x.len() != expected`.
/// - `InvalidParameter { name, .. }` on the first non-finite or negative
///   entry.
pub fn validate_interarrivals(
    name: &'static str, x: ArrayView1<f64>, expected: usize,
) -> ScheduleResult<()> {
    if x.len() != expected {
        return Err(ScheduleError::LengthMismatch { name, expected, actual: x.len() });
    }
    for &xi in x.iter() {
        if !xi.is_finite() {
            return Err(ScheduleError::InvalidParameter {
                name,
                value: xi,
                reason: "interarrival times must be finite",
            });
        }
        if xi < 0.0 {
            return Err(ScheduleError::InvalidParameter {
                name,
                value: xi,
                reason: "interarrival times must be non-negative",
            });
        }
    }
    Ok(())
}

// ---- Helper Methods ----

fn positive_finite(name: &'static str, value: f64) -> ScheduleResult<f64> {
    if !value.is_finite() {
        return Err(ScheduleError::InvalidParameter { name, value, reason: "must be finite" });
    }
    if value <= 0.0 {
        return Err(ScheduleError::InvalidParameter {
            name,
            value,
            reason: "must be strictly positive",
        });
    }
    Ok(value)
}
