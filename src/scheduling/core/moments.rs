//! Service-time moments — validated first two moments of the service law.
//!
//! [`ServiceMoments`] is the only description of the service distribution
//! the engine needs: its mean and squared coefficient of variation (SCV).
//! The phase-type fit in [`phase_type`](super::phase_type) matches exactly
//! these two quantities.
use crate::scheduling::{
    core::validation::{validate_mean, validate_scv},
    errors::ScheduleResult,
};

/// Mean and squared coefficient of variation of a service-time distribution.
///
/// Invariants
/// ----------
/// - `mean` is finite and `> 0`.
/// - `scv` (variance / mean²) is finite and `> 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceMoments {
    mean: f64,
    scv: f64,
}

impl ServiceMoments {
    /// Validate and bundle `(mean, scv)`.
    ///
    /// # Errors
    /// `ScheduleError::InvalidParameter` if either value is non-finite or
    /// not strictly positive.
    pub fn new(mean: f64, scv: f64) -> ScheduleResult<Self> {
        let mean = validate_mean(mean)?;
        let scv = validate_scv(scv)?;
        Ok(ServiceMoments { mean, scv })
    }

    /// Unit-mean moments with the given SCV, the normalization the optimizer
    /// works in.
    pub fn unit_mean(scv: f64) -> ScheduleResult<Self> {
        Self::new(1.0, scv)
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn scv(&self) -> f64 {
        self.scv
    }

    /// Service-time variance `scv · mean²`.
    pub fn variance(&self) -> f64 {
        self.scv * self.mean * self.mean
    }

    /// Raw second moment `E[B²] = (1 + scv) · mean²`.
    pub fn second_moment(&self) -> f64 {
        (1.0 + self.scv) * self.mean * self.mean
    }
}
