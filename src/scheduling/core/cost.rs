//! Transient cost — exact expected idle/wait cost of a candidate schedule.
//!
//! Purpose
//! -------
//! Map a vector of interarrival times `x` to
//! `ω · E[total idle time] + (1 − ω) · E[total waiting time]` using transient
//! analysis of the joint chain. Between two arrivals the chain evolves for
//! `x_i` time units, so the state distribution moves by `exp(Sn_d · x_i)`
//! and the accumulated cost over the interval has the closed form
//! `P · Sn_d⁻¹ · (ω·1 − exp(Sn_d · x_i)·1)`, where `Sn_d` is the leading
//! block of `Sn` covering the clients seen so far.
//!
//! Key behaviors
//! -------------
//! - Clients already waiting at the decision epoch contribute only their
//!   remaining wait and are processed first. Scheduled clients follow in
//!   order; each stage works on a state `m` entries larger than the last.
//! - [`TransientCostEvaluator::evaluate_with_gradient`] additionally returns
//!   `∂c/∂x` from one reverse (adjoint) sweep over the stored forward
//!   stages, so a gradient costs about one extra evaluation instead of
//!   `2·n` of them.
//!
//! Invariants & assumptions
//! ------------------------
//! - `x.len() + wis <= chain.horizon()` and `m` agrees between model and
//!   chain.
//! - Matrix exponentials are checked for overflow. A non-finite cost or
//!   gradient is reported as `NumericalInstability { stage: Evaluate, .. }`.
//!
//! Testing notes
//! -------------
//! - Closed forms for exponential service (one client, and one queued plus
//!   one scheduled) pin the evaluator down exactly.
//! - The adjoint gradient is compared against central finite differences in
//!   both service regimes, with and without waiting clients.
use crate::scheduling::{
    core::{
        chain::JointChain,
        linalg::checked_expm,
        phase_type::PhaseTypeModel,
        state::ProbabilityState,
        validation::{validate_horizon, validate_interarrivals, validate_omega},
    },
    errors::{ScheduleError, ScheduleResult, Stage},
};
use ndarray::{Array1, Array2, ArrayView1, s};

/// Evaluate the expected cost of `x` given a fitted model and its chain.
///
/// Convenience wrapper over [`TransientCostEvaluator`].
pub fn evaluate_cost(
    x: ArrayView1<f64>, model: &PhaseTypeModel, chain: &JointChain, omega: f64, wis: usize,
) -> ScheduleResult<f64> {
    TransientCostEvaluator::new(model, chain, omega, wis)?.evaluate(x)
}

/// Cost functional bound to one `(model, chain, ω, wis)` configuration.
#[derive(Debug, Clone, Copy)]
pub struct TransientCostEvaluator<'a> {
    model: &'a PhaseTypeModel,
    chain: &'a JointChain,
    omega: f64,
    wis: usize,
}

/// Quantities of one scheduled stage kept for the reverse sweep.
struct StageRecord {
    p: Array1<f64>,
    e: Array2<f64>,
    v: Array1<f64>,
    stay: f64,
}

impl<'a> TransientCostEvaluator<'a> {
    /// Bind the evaluator after checking ω, `wis` and phase agreement.
    ///
    /// # Errors
    /// - `InvalidParameter` for ω outside `(0, 1)` or `wis >= horizon`.
    /// - `LengthMismatch { name: "phases", .. }` if model and chain disagree
    ///   on `m`.
    pub fn new(
        model: &'a PhaseTypeModel, chain: &'a JointChain, omega: f64, wis: usize,
    ) -> ScheduleResult<Self> {
        let omega = validate_omega(omega)?;
        validate_horizon(chain.horizon(), wis)?;
        if model.phases() != chain.phases() {
            return Err(ScheduleError::LengthMismatch {
                name: "phases",
                expected: chain.phases(),
                actual: model.phases(),
            });
        }
        Ok(TransientCostEvaluator { model, chain, omega, wis })
    }

    pub fn omega(&self) -> f64 {
        self.omega
    }

    pub fn waiting_in_system(&self) -> usize {
        self.wis
    }

    /// Number of interarrival times a full schedule carries,
    /// `horizon − wis`.
    pub fn schedule_len(&self) -> usize {
        self.chain.horizon() - self.wis
    }

    /// Expected cost of `x`.
    ///
    /// # Errors
    /// - `LengthMismatch` / `InvalidParameter` for malformed `x`.
    /// - `NumericalInstability { stage: Evaluate, .. }` on overflow or a
    ///   non-finite total.
    pub fn evaluate(&self, x: ArrayView1<f64>) -> ScheduleResult<f64> {
        let (cost, _) = self.forward(x, false)?;
        Ok(cost)
    }

    /// Expected cost of `x` together with its gradient `∂c/∂x`.
    pub fn evaluate_with_gradient(&self, x: ArrayView1<f64>) -> ScheduleResult<(f64, Array1<f64>)> {
        let (cost, stages) = self.forward(x, true)?;
        let grad = self.backward(&stages)?;
        Ok((cost, grad))
    }

    // ---- Helper Methods ----

    fn check_schedule(&self, x: ArrayView1<f64>) -> ScheduleResult<()> {
        let room = self.schedule_len();
        if x.len() > room {
            return Err(ScheduleError::LengthMismatch {
                name: "x",
                expected: room,
                actual: x.len(),
            });
        }
        validate_interarrivals("x", x, x.len())
    }

    fn forward(&self, x: ArrayView1<f64>, record: bool) -> ScheduleResult<(f64, Vec<StageRecord>)> {
        self.check_schedule(x)?;
        let m = self.chain.phases();
        let omega = self.omega;
        let alpha = self.model.alpha().view();
        let mut state = ProbabilityState::new(self.model.alpha_start().view(), self.chain.dim())?;
        let mut cost = omega * x.sum();

        for i in 1..=self.wis {
            let d = i * m;
            let remaining = state.active().dot(&self.chain.inverse_block(d)).sum();
            cost += (omega - 1.0) * remaining;
            state.extend_with_fresh_start(alpha)?;
        }

        let mut stages = Vec::with_capacity(if record { x.len() } else { 0 });
        for (j, &xj) in x.iter().enumerate() {
            let d = (self.wis + 1 + j) * m;
            let e = checked_expm(self.chain.generator_block(d), xj)?;
            let mut rhs = e.sum_axis(ndarray::Axis(1));
            rhs.mapv_inplace(|r| omega - r);
            let v = self.chain.inverse_block(d).dot(&rhs);
            cost += state.active().dot(&v);

            let p = if record { Some(state.active().to_owned()) } else { None };
            state.propagate(e.view())?;
            let stay = state.mass();
            state.extend_with_fresh_start(alpha)?;

            if let Some(p) = p {
                stages.push(StageRecord { p, e, v, stay });
            }
        }

        if !cost.is_finite() {
            return Err(ScheduleError::unstable(Stage::Evaluate, format!("cost is {cost}")));
        }
        Ok((cost, stages))
    }

    fn backward(&self, stages: &[StageRecord]) -> ScheduleResult<Array1<f64>> {
        let m = self.chain.phases();
        let alpha = self.model.alpha();
        let mut grad = Array1::<f64>::zeros(stages.len());
        let mut lambda_next: Option<Array1<f64>> = None;

        for (j, stage) in stages.iter().enumerate().rev() {
            let d = (self.wis + 1 + j) * m;
            // Pull λ back through P' = [Q, α(1 − Q·1)].
            let g = match &lambda_next {
                Some(lambda) => {
                    let restart = alpha.dot(&lambda.slice(s![d..]));
                    lambda.slice(s![..d]).mapv(|l| l - restart)
                }
                None => Array1::<f64>::zeros(d),
            };
            let eg = stage.e.dot(&g);
            let a_eg = self.chain.generator_block(d).dot(&eg);
            grad[j] = self.omega - stage.stay + stage.p.dot(&a_eg);
            lambda_next = Some(&stage.v + &eg);
        }

        if grad.iter().any(|g| !g.is_finite()) {
            return Err(ScheduleError::unstable(Stage::Evaluate, "gradient has non-finite entries"));
        }
        Ok(grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::core::{chain::assemble_chain, phase_type::fit_service_distribution};
    use ndarray::array;

    fn setup(scv: f64, elapsed: f64, horizon: usize) -> (PhaseTypeModel, JointChain) {
        let model = fit_service_distribution(1.0, scv, elapsed).unwrap();
        let chain = assemble_chain(&model, horizon).unwrap();
        (model, chain)
    }

    #[test]
    // Purpose
    // -------
    // One exponential client in service, one arrival after x.
    //
    // Expect
    // ------
    // c(x) = ω(x − 1 + e^{−x}) + (1 − ω)e^{−x}.
    fn single_exponential_client_matches_closed_form() {
        let (model, chain) = setup(1.0, 0.0, 1);
        for &(x, omega) in &[(0.0, 0.5), (0.4, 0.3), (1.7, 0.8), (5.0, 0.1)] {
            // Act
            let c = evaluate_cost(array![x].view(), &model, &chain, omega, 0).unwrap();

            // Assert
            let ex = (-x as f64).exp();
            let expected = omega * (x - 1.0 + ex) + (1.0 - omega) * ex;
            assert!((c - expected).abs() < 1e-12, "x = {x}, ω = {omega}: {c} vs {expected}");
        }
    }

    #[test]
    // Purpose
    // -------
    // One queued exponential client plus one scheduled arrival: the new
    // client faces Erlang-2 work and the queued one waits a full service.
    //
    // Expect
    // ------
    // c(x) = ωx − 3ω + 1 + (2 + x)e^{−x}.
    fn waiting_client_contributes_its_remaining_wait() {
        let (model, chain) = setup(1.0, 0.0, 2);
        for &(x, omega) in &[(0.5, 0.5), (2.0, 0.2), (3.5, 0.9)] {
            let c = evaluate_cost(array![x].view(), &model, &chain, omega, 1).unwrap();
            let expected = omega * x - 3.0 * omega + 1.0 + (2.0 + x) * (-x as f64).exp();
            assert!((c - expected).abs() < 1e-12, "x = {x}, ω = {omega}");
        }
    }

    #[test]
    // Purpose
    // -------
    // The adjoint gradient agrees with central finite differences.
    fn adjoint_gradient_matches_finite_differences() {
        let cases: [(f64, f64, usize, usize, Array1<f64>); 4] = [
            (0.5, 0.0, 3, 0, array![0.8, 1.3, 0.6]),
            (2.0, 0.7, 4, 1, array![1.1, 0.4, 2.2]),
            (0.3, 0.2, 3, 0, array![0.9, 1.0, 1.4]),
            (1.0, 0.0, 3, 2, array![1.6]),
        ];
        for (scv, elapsed, horizon, wis, x) in cases {
            // Arrange
            let (model, chain) = setup(scv, elapsed, horizon);
            let eval = TransientCostEvaluator::new(&model, &chain, 0.4, wis).unwrap();

            // Act
            let (c, grad) = eval.evaluate_with_gradient(x.view()).unwrap();

            // Assert
            assert!((c - eval.evaluate(x.view()).unwrap()).abs() < 1e-14);
            let h = 1e-6;
            for k in 0..x.len() {
                let mut up = x.clone();
                let mut dn = x.clone();
                up[k] += h;
                dn[k] -= h;
                let fd = (eval.evaluate(up.view()).unwrap() - eval.evaluate(dn.view()).unwrap())
                    / (2.0 * h);
                assert!(
                    (fd - grad[k]).abs() < 1e-6,
                    "scv {scv}, wis {wis}, k {k}: fd {fd} vs adjoint {}",
                    grad[k]
                );
            }
        }
    }

    #[test]
    // Purpose
    // -------
    // For a generous schedule idle time dominates waiting time, so the cost
    // is non-decreasing in ω. The cost is affine in ω in every case.
    fn cost_is_affine_and_non_decreasing_in_omega_for_generous_schedule() {
        let (model, chain) = setup(0.5, 0.0, 3);
        let x = array![3.0, 3.0, 3.0];
        let omegas = [0.1, 0.3, 0.5, 0.7, 0.9];
        let costs: Vec<f64> = omegas
            .iter()
            .map(|&w| evaluate_cost(x.view(), &model, &chain, w, 0).unwrap())
            .collect();
        for pair in costs.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert!((costs[2] - 0.5 * (costs[1] + costs[3])).abs() < 1e-12);
    }

    #[test]
    fn zero_gaps_are_pure_waiting() {
        // Everyone arrives at once: no idle time, waits of 1 and 2 services.
        let (model, chain) = setup(1.0, 0.0, 2);
        let c = evaluate_cost(array![0.0, 0.0].view(), &model, &chain, 0.5, 0).unwrap();
        assert!((c - 0.5 * (1.0 + 2.0)).abs() < 1e-12);
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let (model, chain) = setup(2.0, 0.0, 3);
        assert!(matches!(
            evaluate_cost(array![1.0, 1.0, 1.0].view(), &model, &chain, 0.5, 1),
            Err(ScheduleError::LengthMismatch { name: "x", expected: 2, actual: 3 })
        ));
        assert!(matches!(
            evaluate_cost(array![1.0, -1.0].view(), &model, &chain, 0.5, 1),
            Err(ScheduleError::InvalidParameter { name: "x", .. })
        ));
        assert!(matches!(
            evaluate_cost(array![1.0].view(), &model, &chain, 1.2, 0),
            Err(ScheduleError::InvalidParameter { name: "omega", .. })
        ));
        assert!(matches!(
            evaluate_cost(array![1.0].view(), &model, &chain, 0.5, 3),
            Err(ScheduleError::InvalidParameter { name: "waiting_in_system", .. })
        ));

        let other = fit_service_distribution(1.0, 0.5, 0.0).unwrap();
        assert!(matches!(
            TransientCostEvaluator::new(&other, &chain, 0.5, 0),
            Err(ScheduleError::LengthMismatch { name: "phases", .. })
        ));
    }
}
