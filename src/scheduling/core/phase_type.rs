//! Phase-type fit — moment-matched Markov approximation of a service law.
//!
//! Purpose
//! -------
//! Replace an arbitrary service-time distribution, known only through its
//! mean and squared coefficient of variation (SCV), by a phase-type law:
//! the time to absorption of a small continuous-time Markov chain with
//! sub-generator `S` and start distribution `alpha`. The fitted model also
//! carries `alpha_start`, the phase distribution of the client currently in
//! service given that it has already been served for `u` time units.
//!
//! Key behaviors
//! -------------
//! - `SCV < 1`: weighted Erlang on `K + 1` phases, `K = ⌊1/SCV⌋`. A client
//!   walks through phases at rate `mu` and leaves after phase `K − 1` with
//!   probability `p`, otherwise passes through one more phase.
//! - `SCV = 1`: a single exponential phase.
//! - `SCV > 1`: two-phase hyperexponential with balanced means.
//! - `alpha_start` is the residual phase distribution after `u` units of
//!   service. It is computed from log-weights and normalized with a
//!   max-shift so a long elapsed time cannot underflow to `0/0`.
//!
//! Invariants & assumptions
//! ------------------------
//! - `S` has strictly negative diagonal, non-negative off-diagonal entries
//!   and non-positive row sums.
//! - `alpha` and `alpha_start` are non-negative and sum to one.
//! - The fitted model reproduces the requested mean and SCV (see
//!   [`PhaseTypeModel::mean`] and [`PhaseTypeModel::scv`]).
//! - `u = 0` yields `alpha_start == alpha` exactly.
//!
//! Testing notes
//! -------------
//! - Unit tests cover each regime, moment reconstruction over a grid of SCV
//!   values, the `u = 0` identity and very long elapsed times.
use crate::scheduling::{
    core::{
        linalg::{checked_inverse, from_dmatrix, to_dmatrix},
        moments::ServiceMoments,
        validation::validate_elapsed,
    },
    errors::{ScheduleError, ScheduleResult, Stage},
};
use ndarray::{Array1, Array2};
use statrs::distribution::{Discrete, Poisson};
use tracing::debug;

/// Tolerance on `|Σ alpha − 1|` accepted by [`PhaseTypeModel::from_parts`].
pub const PROBABILITY_TOL: f64 = 1e-9;

/// Largest phase count the weighted-Erlang fit may produce; SCVs at or
/// below `1 / MAX_PHASES` are rejected before anything is allocated.
pub const MAX_PHASES: usize = 101;

/// Fitted phase-type service model `(S, alpha, alpha_start)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTypeModel {
    s: Array2<f64>,
    alpha: Array1<f64>,
    alpha_start: Array1<f64>,
}

impl PhaseTypeModel {
    /// Assemble a model from raw parts after checking the structural
    /// invariants of a phase-type representation.
    ///
    /// # Errors
    /// `NumericalInstability { stage: Fit, .. }` if shapes disagree, `S`
    /// violates the sign pattern of a sub-generator, or either start vector
    /// is not a probability vector.
    pub fn from_parts(
        s: Array2<f64>, alpha: Array1<f64>, alpha_start: Array1<f64>,
    ) -> ScheduleResult<Self> {
        let m = alpha.len();
        if m == 0 || s.dim() != (m, m) || alpha_start.len() != m {
            return Err(ScheduleError::unstable(
                Stage::Fit,
                format!(
                    "inconsistent shapes: S is {:?}, alpha has {}, alpha_start has {}",
                    s.dim(),
                    m,
                    alpha_start.len()
                ),
            ));
        }
        for i in 0..m {
            let mut row_sum = 0.0;
            for j in 0..m {
                let v = s[[i, j]];
                if !v.is_finite() || (i == j && v >= 0.0) || (i != j && v < 0.0) {
                    return Err(ScheduleError::unstable(
                        Stage::Fit,
                        format!("S[{i},{j}] = {v} breaks the sub-generator sign pattern"),
                    ));
                }
                row_sum += v;
            }
            if row_sum > PROBABILITY_TOL {
                return Err(ScheduleError::unstable(
                    Stage::Fit,
                    format!("row {i} of S sums to {row_sum} > 0"),
                ));
            }
        }
        check_probability_vector("alpha", &alpha)?;
        check_probability_vector("alpha_start", &alpha_start)?;
        Ok(PhaseTypeModel { s, alpha, alpha_start })
    }

    /// Number of phases `m`.
    pub fn phases(&self) -> usize {
        self.alpha.len()
    }

    /// Sub-generator `S` (`m × m`).
    pub fn s(&self) -> &Array2<f64> {
        &self.s
    }

    /// Start distribution of a fresh client.
    pub fn alpha(&self) -> &Array1<f64> {
        &self.alpha
    }

    /// Phase distribution of the client in service after the elapsed time.
    pub fn alpha_start(&self) -> &Array1<f64> {
        &self.alpha_start
    }

    /// Absorption-rate column `−S·1`.
    pub fn exit_rates(&self) -> Array1<f64> {
        self.s.sum_axis(ndarray::Axis(1)).mapv(|v| (-v).max(0.0))
    }

    /// Raw moment `E[B^k] = k! · alpha · (−S)^{−k} · 1` of a fresh service.
    ///
    /// # Errors
    /// `NumericalInstability { stage: Invert, .. }` if `S` cannot be
    /// inverted.
    pub fn moment(&self, k: u32) -> ScheduleResult<f64> {
        let neg_inv = checked_inverse((-&self.s).view())?;
        let neg_inv = to_dmatrix(neg_inv.view());
        let mut power = nalgebra::DMatrix::<f64>::identity(self.phases(), self.phases());
        let mut factorial = 1.0;
        for i in 1..=k {
            power = &power * &neg_inv;
            factorial *= i as f64;
        }
        let power = from_dmatrix(&power);
        Ok(factorial * self.alpha.dot(&power).sum())
    }

    /// Mean of a fresh service time.
    pub fn mean(&self) -> ScheduleResult<f64> {
        self.moment(1)
    }

    /// Squared coefficient of variation of a fresh service time.
    pub fn scv(&self) -> ScheduleResult<f64> {
        let m1 = self.moment(1)?;
        let m2 = self.moment(2)?;
        Ok((m2 - m1 * m1) / (m1 * m1))
    }
}

/// Fit a phase-type model to `(mean, scv)` and condition the in-service
/// client on `elapsed` units of completed service.
///
/// Parameters
/// ----------
/// - `mean`: `f64`, strictly positive.
/// - `scv`: `f64`, strictly positive.
/// - `elapsed`: `f64`, non-negative, in the same time unit as `mean`.
///
/// Errors
/// ------
/// - `InvalidParameter` for out-of-range inputs.
/// - `NumericalInstability { stage: Fit, .. }` if the fitted parts fail the
///   structural checks of [`PhaseTypeModel::from_parts`].
///
/// Examples
/// --------
/// ```rust
/// use adaptive_schedule::scheduling::core::phase_type::fit_service_distribution;
///
/// let model = fit_service_distribution(1.0, 0.5, 0.0)?;
/// assert_eq!(model.phases(), 3);
/// assert!((model.scv()? - 0.5).abs() < 1e-9);
/// # Ok::<(), adaptive_schedule::scheduling::errors::ScheduleError>(())
/// ```
pub fn fit_service_distribution(
    mean: f64, scv: f64, elapsed: f64,
) -> ScheduleResult<PhaseTypeModel> {
    let moments = ServiceMoments::new(mean, scv)?;
    let elapsed = validate_elapsed(elapsed)?;
    fit_moments(&moments, elapsed)
}

/// [`fit_service_distribution`] for already-validated moments.
pub fn fit_moments(moments: &ServiceMoments, elapsed: f64) -> ScheduleResult<PhaseTypeModel> {
    let elapsed = validate_elapsed(elapsed)?;
    let (mean, scv) = (moments.mean(), moments.scv());
    let model = if scv == 1.0 {
        exponential(mean)?
    } else if scv < 1.0 {
        weighted_erlang(mean, scv, elapsed)?
    } else {
        hyperexponential(mean, scv, elapsed)?
    };
    debug!(mean, scv, elapsed, phases = model.phases(), "fitted phase-type service model");
    Ok(model)
}

// ---- Regimes ----

fn exponential(mean: f64) -> ScheduleResult<PhaseTypeModel> {
    let s = Array2::from_elem((1, 1), -1.0 / mean);
    let alpha = Array1::ones(1);
    PhaseTypeModel::from_parts(s, alpha.clone(), alpha)
}

fn weighted_erlang(mean: f64, scv: f64, elapsed: f64) -> ScheduleResult<PhaseTypeModel> {
    let k_real = (1.0 / scv).floor();
    if !(k_real < MAX_PHASES as f64) {
        return Err(ScheduleError::InvalidParameter {
            name: "scv",
            value: scv,
            reason: "too small: the weighted-Erlang fit would exceed the phase limit",
        });
    }
    let k = k_real as usize;
    let kf = k as f64;
    let disc = ((kf + 1.0) * (1.0 - kf * scv)).max(0.0);
    let p = (((kf + 1.0) * scv - disc.sqrt()) / (scv + 1.0)).clamp(0.0, 1.0);
    let mu = (kf + 1.0 - p) / mean;
    let m = k + 1;

    let mut s = Array2::<f64>::zeros((m, m));
    for i in 0..m {
        s[[i, i]] = -mu;
    }
    for i in 0..k.saturating_sub(1) {
        s[[i, i + 1]] = mu;
    }
    s[[k - 1, k]] = (1.0 - p) * mu;

    let mut alpha = Array1::<f64>::zeros(m);
    alpha[0] = 1.0;

    let alpha_start = if elapsed == 0.0 {
        alpha.clone()
    } else {
        let rate = mu * elapsed;
        let poisson = Poisson::new(rate).map_err(|e| {
            ScheduleError::unstable(Stage::Fit, format!("Poisson({rate}) rejected: {e}"))
        })?;
        let mut log_w: Array1<f64> = (0..m).map(|z| poisson.ln_pmf(z as u64)).collect();
        log_w[k] += (1.0 - p).ln();
        normalize_log_weights(log_w)?
    };
    PhaseTypeModel::from_parts(s, alpha, alpha_start)
}

fn hyperexponential(mean: f64, scv: f64, elapsed: f64) -> ScheduleResult<PhaseTypeModel> {
    let p = (1.0 + ((scv - 1.0) / (scv + 1.0)).sqrt()) / 2.0;
    let mu1 = 2.0 * p / mean;
    let mu2 = 2.0 * (1.0 - p) / mean;

    let mut s = Array2::<f64>::zeros((2, 2));
    s[[0, 0]] = -mu1;
    s[[1, 1]] = -mu2;
    let alpha = ndarray::array![p, 1.0 - p];

    let alpha_start = if elapsed == 0.0 {
        alpha.clone()
    } else {
        let log_w = ndarray::array![p.ln() - mu1 * elapsed, (1.0 - p).ln() - mu2 * elapsed];
        normalize_log_weights(log_w)?
    };
    PhaseTypeModel::from_parts(s, alpha, alpha_start)
}

// ---- Helper Methods ----

/// Exponentiate log-weights after subtracting their maximum, clamp rounding
/// negatives to zero and renormalize.
fn normalize_log_weights(log_w: Array1<f64>) -> ScheduleResult<Array1<f64>> {
    let max = log_w.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return Err(ScheduleError::unstable(
            Stage::Fit,
            "elapsed-time weights are all zero or non-finite",
        ));
    }
    let w = log_w.mapv(|lw| (lw - max).exp().max(0.0));
    let total = w.sum();
    Ok(w / total)
}

fn check_probability_vector(name: &str, v: &Array1<f64>) -> ScheduleResult<()> {
    if v.iter().any(|&p| !p.is_finite() || p < 0.0) {
        return Err(ScheduleError::unstable(
            Stage::Fit,
            format!("{name} has a negative or non-finite entry"),
        ));
    }
    let total = v.sum();
    if (total - 1.0).abs() > PROBABILITY_TOL {
        return Err(ScheduleError::unstable(Stage::Fit, format!("{name} sums to {total}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn rel_err(a: f64, b: f64) -> f64 {
        (a - b).abs() / b.abs()
    }

    #[test]
    // Purpose
    // -------
    // SCV = 1 collapses to a single exponential phase.
    //
    // Expect
    // ------
    // m = 1, S = [−1/mean], alpha = alpha_start = [1].
    fn unit_scv_yields_single_exponential_phase() {
        // Arrange / Act
        let model = fit_service_distribution(2.0, 1.0, 0.7).unwrap();

        // Assert
        assert_eq!(model.phases(), 1);
        assert_eq!(model.s(), &array![[-0.5]]);
        assert_eq!(model.alpha(), &array![1.0]);
        assert_eq!(model.alpha_start(), &array![1.0]);
    }

    #[test]
    // Purpose
    // -------
    // Moment matching holds across both regimes and non-unit means.
    fn reconstructed_mean_and_scv_match_inputs() {
        for &mean in &[0.3, 1.0, 4.0] {
            for &scv in &[0.05, 0.2, 0.3, 0.5, 0.77, 0.99, 1.0, 1.01, 2.0, 5.5] {
                // Act
                let model = fit_service_distribution(mean, scv, 0.0).unwrap();

                // Assert
                let fitted_mean = model.mean().unwrap();
                let fitted_scv = model.scv().unwrap();
                assert!(rel_err(fitted_mean, mean) < 1e-6, "mean {mean}, scv {scv}");
                assert!(rel_err(fitted_scv, scv) < 1e-6, "mean {mean}, scv {scv}: {fitted_scv}");
            }
        }
    }

    #[test]
    fn phase_counts_follow_regime() {
        assert_eq!(fit_service_distribution(1.0, 0.5, 0.0).unwrap().phases(), 3);
        assert_eq!(fit_service_distribution(1.0, 0.3, 0.0).unwrap().phases(), 4);
        assert_eq!(fit_service_distribution(1.0, 3.0, 0.0).unwrap().phases(), 2);
    }

    #[test]
    fn zero_elapsed_time_gives_fresh_start_exactly() {
        for &scv in &[0.25, 0.6, 1.0, 1.8] {
            let model = fit_service_distribution(1.0, scv, 0.0).unwrap();
            assert_eq!(model.alpha(), model.alpha_start());
        }
    }

    #[test]
    // Purpose
    // -------
    // Elapsed service shifts mass to later Erlang phases and to the slow
    // hyperexponential branch.
    fn elapsed_time_moves_mass_toward_slower_states() {
        // Erlang: phase 0 loses mass.
        let erlang = fit_service_distribution(1.0, 0.4, 0.8).unwrap();
        assert!(erlang.alpha_start()[0] < 1.0);
        assert!((erlang.alpha_start().sum() - 1.0).abs() < 1e-12);

        // Hyperexponential: branch 1 (rate mu2 < mu1) gains mass.
        let hyper = fit_service_distribution(1.0, 2.0, 1.5).unwrap();
        assert!(hyper.alpha_start()[1] > hyper.alpha()[1]);
        assert!((hyper.alpha_start().sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn very_long_elapsed_time_stays_normalized() {
        // Plain pmf values underflow here; the log-space weights must not.
        let erlang = fit_service_distribution(1.0, 0.3, 500.0).unwrap();
        assert!(erlang.alpha_start().iter().all(|p| p.is_finite() && *p >= 0.0));
        assert!((erlang.alpha_start().sum() - 1.0).abs() < 1e-12);

        let hyper = fit_service_distribution(1.0, 4.0, 1e4).unwrap();
        assert!((hyper.alpha_start()[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn integer_inverse_scv_never_reaches_terminal_phase() {
        // SCV = 1/2 gives p = 1: a pure Erlang-2, phase K unreachable.
        let model = fit_service_distribution(1.0, 0.5, 0.9).unwrap();
        assert_eq!(model.s()[[1, 2]], 0.0);
        assert_eq!(model.alpha_start()[2], 0.0);
        assert!((model.s()[[0, 0]] + 2.0).abs() < 1e-12);
    }

    #[test]
    fn from_parts_rejects_broken_generators() {
        let alpha = array![1.0, 0.0];
        let bad_sign = array![[-1.0, -0.5], [0.0, -1.0]];
        assert!(PhaseTypeModel::from_parts(bad_sign, alpha.clone(), alpha.clone()).is_err());

        let positive_row = array![[-1.0, 2.0], [0.0, -1.0]];
        assert!(PhaseTypeModel::from_parts(positive_row, alpha.clone(), alpha.clone()).is_err());

        let ok = array![[-1.0, 1.0], [0.0, -1.0]];
        let not_prob = array![0.7, 0.7];
        assert!(PhaseTypeModel::from_parts(ok, alpha, not_prob).is_err());
    }

    #[test]
    fn invalid_inputs_fail_before_fitting() {
        assert!(matches!(
            fit_service_distribution(0.0, 1.0, 0.0),
            Err(ScheduleError::InvalidParameter { name: "mean", .. })
        ));
        assert!(matches!(
            fit_service_distribution(1.0, -0.2, 0.0),
            Err(ScheduleError::InvalidParameter { name: "scv", .. })
        ));
        assert!(matches!(
            fit_service_distribution(1.0, 0.5, -1.0),
            Err(ScheduleError::InvalidParameter { name: "elapsed", .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Vanishing SCVs would need an unbounded number of Erlang phases; they
    // are rejected as invalid instead of overflowing or exhausting memory.
    //
    // Expect
    // ------
    // `InvalidParameter { name: "scv" }` for tiny SCVs, while the smallest
    // admissible SCV still fits with exactly `MAX_PHASES` phases.
    fn vanishing_scv_is_rejected_before_allocation() {
        // Arrange / Act / Assert
        for scv in [1e-20, 1e-6, 1.0 / (MAX_PHASES as f64 + 0.5)] {
            assert!(
                matches!(
                    fit_service_distribution(1.0, scv, 0.0),
                    Err(ScheduleError::InvalidParameter { name: "scv", .. })
                ),
                "scv {scv}"
            );
        }
        let edge = fit_service_distribution(1.0, 0.01, 0.3).unwrap();
        assert_eq!(edge.phases(), MAX_PHASES);
    }
}
