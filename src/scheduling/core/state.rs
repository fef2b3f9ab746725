//! Probability state — growing joint distribution over (phase, completions).
//!
//! The cost evaluator walks the schedule client by client. After each
//! arrival the joint distribution gains one block of `m` entries: the mass
//! that has escaped all tracked blocks restarts service according to
//! `alpha`. [`ProbabilityState`] keeps that row vector in a buffer sized
//! once for the whole chain and tracks how much of it is active, so a cost
//! evaluation performs no reallocation of the state itself.
use crate::scheduling::errors::{ScheduleError, ScheduleResult, Stage};
use ndarray::{Array1, ArrayView1, ArrayView2, s};

/// Row vector `P` over the first `len` states of the joint chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityState {
    buf: Array1<f64>,
    len: usize,
}

impl ProbabilityState {
    /// Start from `initial` inside a buffer of `capacity` entries.
    ///
    /// # Errors
    /// `NumericalInstability { stage: Evaluate, .. }` if `initial` does not
    /// fit in `capacity`.
    pub fn new(initial: ArrayView1<f64>, capacity: usize) -> ScheduleResult<Self> {
        if initial.len() > capacity {
            return Err(ScheduleError::unstable(
                Stage::Evaluate,
                format!("initial state of {} entries exceeds capacity {capacity}", initial.len()),
            ));
        }
        let mut buf = Array1::<f64>::zeros(capacity);
        buf.slice_mut(s![..initial.len()]).assign(&initial);
        Ok(ProbabilityState { buf, len: initial.len() })
    }

    /// Active entries `P[..len]`.
    pub fn active(&self) -> ArrayView1<'_, f64> {
        self.buf.slice(s![..self.len])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total probability held by the active entries.
    pub fn mass(&self) -> f64 {
        self.active().sum()
    }

    /// Replace the active entries by `P · E` for a square `E` of the active
    /// dimension.
    pub fn propagate(&mut self, e: ArrayView2<f64>) -> ScheduleResult<()> {
        if e.dim() != (self.len, self.len) {
            return Err(ScheduleError::unstable(
                Stage::Evaluate,
                format!("transition block {:?} does not match state length {}", e.dim(), self.len),
            ));
        }
        let next = self.active().dot(&e);
        self.buf.slice_mut(s![..self.len]).assign(&next);
        Ok(())
    }

    /// Append `alpha · (1 − mass)`: the escaped mass starts a fresh service.
    ///
    /// Returns the escaped mass, clamped at zero when rounding pushes the
    /// tracked mass above one.
    pub fn extend_with_fresh_start(&mut self, alpha: ArrayView1<f64>) -> ScheduleResult<f64> {
        let m = alpha.len();
        if self.len + m > self.buf.len() {
            return Err(ScheduleError::unstable(
                Stage::Evaluate,
                format!(
                    "state of {} entries cannot grow by {m} within capacity {}",
                    self.len,
                    self.buf.len()
                ),
            ));
        }
        let escaped = (1.0 - self.mass()).max(0.0);
        let start = self.len;
        self.buf.slice_mut(s![start..start + m]).assign(&alpha.mapv(|a| a * escaped));
        self.len += m;
        Ok(escaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    // Purpose
    // -------
    // Escaped mass is redistributed over the next block by alpha.
    fn extension_appends_escaped_mass_by_alpha() {
        // Arrange
        let mut state = ProbabilityState::new(array![0.5, 0.2].view(), 6).unwrap();
        let alpha = array![0.25, 0.75];

        // Act
        let escaped = state.extend_with_fresh_start(alpha.view()).unwrap();

        // Assert
        assert!((escaped - 0.3).abs() < 1e-15);
        assert_eq!(state.len(), 4);
        let active = state.active();
        assert!((active[2] - 0.075).abs() < 1e-15);
        assert!((active[3] - 0.225).abs() < 1e-15);
        assert!((state.mass() - 1.0).abs() < 1e-15);
    }

    #[test]
    // Purpose
    // -------
    // Tracked mass a few ulps above one must not append negative entries.
    fn rounding_excess_appends_no_negative_mass() {
        // Arrange
        let mut state = ProbabilityState::new(array![0.7, 0.3 + 1e-15].view(), 4).unwrap();
        assert!(state.mass() > 1.0);

        // Act
        let escaped = state.extend_with_fresh_start(array![0.4, 0.6].view()).unwrap();

        // Assert
        assert_eq!(escaped, 0.0);
        assert!(state.active().iter().all(|&p| p >= 0.0));
        assert_eq!(state.len(), 4);
    }

    #[test]
    fn propagate_multiplies_on_the_right() {
        let mut state = ProbabilityState::new(array![1.0, 0.0].view(), 2).unwrap();
        let e = array![[0.5, 0.25], [0.0, 1.0]];
        state.propagate(e.view()).unwrap();
        assert_eq!(state.active(), array![0.5, 0.25].view());
    }

    #[test]
    fn capacity_and_shape_are_enforced() {
        assert!(ProbabilityState::new(array![1.0, 0.0, 0.0].view(), 2).is_err());

        let mut state = ProbabilityState::new(array![1.0].view(), 2).unwrap();
        assert!(state.propagate(array![[1.0, 0.0], [0.0, 1.0]].view()).is_err());
        state.extend_with_fresh_start(array![1.0].view()).unwrap();
        assert!(state.extend_with_fresh_start(array![1.0].view()).is_err());
    }
}
