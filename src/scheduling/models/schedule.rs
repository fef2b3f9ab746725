//! Schedule optimizer — minimize the transient cost over interarrival times.
//!
//! Purpose
//! -------
//! Wire the phase-type fit, the joint chain and the transient cost evaluator
//! into the generic L-BFGS minimizer. The expensive pieces (fit, assembly,
//! dense inversion) are built once per [`ScheduleOptimizer`] and shared by
//! every cost evaluation of every run.
//!
//! Key behaviors
//! -------------
//! - Optimize in unconstrained θ-space with `x = softplus(θ)`, so every
//!   iterate is a valid schedule (`x ≥ 0`) without explicit constraints.
//! - [`SchedulingProblem`] implements [`CostObjective`] with an analytic
//!   gradient: the adjoint `∂c/∂x` from [`TransientCostEvaluator`] times
//!   `σ(θ)`.
//! - Report a run that exhausts its iteration or time budget as
//!   [`ScheduleError::OptimizationNonconvergence`] carrying the best point.
//!
//! Invariants & assumptions
//! ------------------------
//! - All time quantities are in units of the mean service time (the model is
//!   fitted with mean 1). Scaling to real time happens in
//!   [`plan`](crate::scheduling::plan).
//! - A schedule for `horizon` clients with `wis` already waiting has
//!   `horizon − wis` entries.
//! - The default initial guess is `1.5` per slot, plus `wis` on the first
//!   slot so the first new arrival does not land on top of the queue.
//!
//! Conventions
//! -----------
//! - Errors raised inside the cost travel through the optimizer layer and
//!   come back with their original stage.
//! - One `debug` span per run; per-evaluation work is not logged.
use crate::{
    optimization::{
        cost_optimizer::{CostObjective, FnEvalMap, Grad, Theta, minimize},
        errors::{OptError, OptResult},
        numerical_stability::{MIN_INTERARRIVAL, safe_logistic, safe_softplus, safe_softplus_inv},
    },
    scheduling::{
        core::{
            chain::{JointChain, assemble_chain},
            cost::TransientCostEvaluator,
            options::{CancelToken, ScheduleOptions},
            phase_type::{PhaseTypeModel, fit_service_distribution},
            validation::{validate_horizon, validate_interarrivals, validate_omega},
        },
        errors::{ScheduleError, ScheduleResult, Stage},
    },
};
use ndarray::{Array1, ArrayView1};
use tracing::{debug, debug_span};

/// Default interarrival time per slot, in mean service times.
pub const DEFAULT_SLOT: f64 = 1.5;

/// Fitted service model and its joint chain, shared by all evaluations.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceChain {
    pub model: PhaseTypeModel,
    pub chain: JointChain,
}

/// Cost objective over θ with `x = softplus(θ)`.
#[derive(Debug, Clone)]
pub struct SchedulingProblem {
    omega: f64,
    wis: usize,
    cancel: Option<CancelToken>,
}

impl SchedulingProblem {
    pub fn new(omega: f64, wis: usize, cancel: Option<CancelToken>) -> ScheduleResult<Self> {
        let omega = validate_omega(omega)?;
        Ok(SchedulingProblem { omega, wis, cancel })
    }

    fn evaluator<'a>(&self, data: &'a ServiceChain) -> ScheduleResult<TransientCostEvaluator<'a>> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(ScheduleError::Cancelled { stage: Stage::Optimize });
        }
        TransientCostEvaluator::new(&data.model, &data.chain, self.omega, self.wis)
    }
}

impl CostObjective for SchedulingProblem {
    type Data = ServiceChain;

    /// Cost of the schedule `softplus(θ)`.
    fn value(&self, theta: &Theta, data: &ServiceChain) -> OptResult<f64> {
        let x = theta.mapv(safe_softplus);
        Ok(self.evaluator(data)?.evaluate(x.view())?)
    }

    /// Check that θ has one entry per schedulable client.
    fn check(&self, theta: &Theta, data: &ServiceChain) -> OptResult<()> {
        let evaluator = self.evaluator(data)?;
        let expected = evaluator.schedule_len();
        if theta.len() != expected {
            return Err(OptError::from(ScheduleError::LengthMismatch {
                name: "initial_guess",
                expected,
                actual: theta.len(),
            }));
        }
        Ok(())
    }

    /// `∂c/∂θ_i = ∂c/∂x_i · σ(θ_i)`.
    fn grad(&self, theta: &Theta, data: &ServiceChain) -> OptResult<Grad> {
        let x = theta.mapv(safe_softplus);
        let (_, dx) = self.evaluator(data)?.evaluate_with_gradient(x.view())?;
        Ok(&dx * &theta.mapv(safe_logistic))
    }
}

/// Result of a converged schedule optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleOutcome {
    /// Optimal interarrival times, one per schedulable client.
    pub schedule: Array1<f64>,
    /// Expected cost at `schedule`.
    pub cost: f64,
    /// Always `true`; budget exhaustion is returned as an error instead.
    pub converged: bool,
    pub iterations: usize,
    pub status: String,
    pub fn_evals: FnEvalMap,
}

/// Fitted model plus chain for one `(scv, elapsed, horizon)` triple.
///
/// Build once, then call [`optimize`](Self::optimize) for any `ω` and
/// `wis < horizon`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleOptimizer {
    data: ServiceChain,
}

impl ScheduleOptimizer {
    /// Fit the unit-mean service model and assemble its chain.
    ///
    /// # Errors
    /// - `InvalidParameter` for a bad SCV, elapsed time or zero horizon.
    /// - `NumericalInstability` from the fit or the inversion.
    pub fn new(scv: f64, elapsed: f64, horizon: usize) -> ScheduleResult<Self> {
        validate_horizon(horizon, 0)?;
        let model = fit_service_distribution(1.0, scv, elapsed)?;
        let chain = assemble_chain(&model, horizon)?;
        Ok(ScheduleOptimizer { data: ServiceChain { model, chain } })
    }

    pub fn model(&self) -> &PhaseTypeModel {
        &self.data.model
    }

    pub fn chain(&self) -> &JointChain {
        &self.data.chain
    }

    pub fn horizon(&self) -> usize {
        self.data.chain.horizon()
    }

    /// Expected cost of a given schedule under this model.
    pub fn cost(&self, x: ArrayView1<f64>, omega: f64, wis: usize) -> ScheduleResult<f64> {
        TransientCostEvaluator::new(&self.data.model, &self.data.chain, omega, wis)?.evaluate(x)
    }

    /// Minimize the expected cost over `horizon − wis` interarrival times.
    ///
    /// Parameters
    /// ----------
    /// - `omega`: idle-time weight in `(0, 1)`.
    /// - `wis`: clients already waiting, `< horizon`.
    /// - `initial_guess`: optional starting schedule of length
    ///   `horizon − wis`, finite and non-negative. Defaults to
    ///   [`default_initial_guess`].
    /// - `options`: solver tolerances, deadline and cancellation.
    ///
    /// Errors
    /// ------
    /// - `InvalidParameter` / `LengthMismatch` for bad inputs.
    /// - `NumericalInstability { stage: Evaluate, .. }` from the cost.
    /// - `OptimizationNonconvergence` when the iteration cap or deadline is
    ///   hit first.
    /// - `Cancelled { stage: Optimize }` when the token fires.
    pub fn optimize(
        &self, omega: f64, wis: usize, initial_guess: Option<ArrayView1<f64>>,
        options: &ScheduleOptions,
    ) -> ScheduleResult<ScheduleOutcome> {
        let horizon = self.horizon();
        validate_horizon(horizon, wis)?;
        let problem = SchedulingProblem::new(omega, wis, options.cancel.clone())?;
        let n = horizon - wis;
        let x0 = match initial_guess {
            Some(guess) => {
                validate_interarrivals("initial_guess", guess, n)?;
                guess.to_owned()
            }
            None => default_initial_guess(n, wis),
        };

        let span = debug_span!("optimize_schedule", omega, horizon, wis);
        let _enter = span.enter();
        if options.is_cancelled() {
            return Err(ScheduleError::Cancelled { stage: Stage::Optimize });
        }

        let theta0 = x0.mapv(|x| safe_softplus_inv(x.max(MIN_INTERARRIVAL)));
        let outcome = minimize(&problem, theta0, &self.data, &options.effective_solver())?;
        let schedule = outcome.theta_hat.mapv(safe_softplus);
        debug!(
            converged = outcome.converged,
            iterations = outcome.iterations,
            cost = outcome.value,
            status = %outcome.status,
            "schedule optimization finished"
        );

        if !outcome.converged {
            return Err(ScheduleError::OptimizationNonconvergence {
                status: outcome.status,
                iterations: outcome.iterations,
                schedule,
                cost: outcome.value,
            });
        }
        Ok(ScheduleOutcome {
            schedule,
            cost: outcome.value,
            converged: true,
            iterations: outcome.iterations,
            status: outcome.status,
            fn_evals: outcome.fn_evals,
        })
    }
}

/// `[1.5 + wis, 1.5, …, 1.5]` with `n` entries.
pub fn default_initial_guess(n: usize, wis: usize) -> Array1<f64> {
    let mut x0 = Array1::from_elem(n, DEFAULT_SLOT);
    if n > 0 {
        x0[0] += wis as f64;
    }
    x0
}

/// Optimal schedule for one request, in mean-service-time units.
///
/// Fits the model, assembles the chain over `horizon` clients and minimizes
/// the expected cost over `horizon − wis` interarrival times.
///
/// # Errors
/// See [`ScheduleOptimizer::new`] and [`ScheduleOptimizer::optimize`].
///
/// # Example
/// ```rust,no_run
/// use adaptive_schedule::scheduling::{
///     core::options::ScheduleOptions, models::schedule::optimize_schedule,
/// };
///
/// let out = optimize_schedule(0.5, 0.0, 0.5, 3, None, 0, &ScheduleOptions::default())?;
/// assert_eq!(out.schedule.len(), 3);
/// # Ok::<(), adaptive_schedule::scheduling::errors::ScheduleError>(())
/// ```
pub fn optimize_schedule(
    scv: f64, elapsed: f64, omega: f64, horizon: usize, initial_guess: Option<ArrayView1<f64>>,
    wis: usize, options: &ScheduleOptions,
) -> ScheduleResult<ScheduleOutcome> {
    validate_omega(omega)?;
    validate_horizon(horizon, wis)?;
    ScheduleOptimizer::new(scv, elapsed, horizon)?.optimize(omega, wis, initial_guess, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::cost_optimizer::adapter::ArgMinAdapter;
    use argmin::core::{CostFunction, Gradient};
    use ndarray::array;
    use std::{cell::Cell, time::Duration};

    #[test]
    // Purpose
    // -------
    // The θ-space gradient returned to the solver matches finite
    // differences of the θ-space cost.
    fn theta_gradient_matches_finite_differences() {
        // Arrange
        let opt = ScheduleOptimizer::new(0.6, 0.3, 3).unwrap();
        let problem = SchedulingProblem::new(0.3, 1, None).unwrap();
        let theta = array![0.4, -0.2];

        // Act
        let grad = problem.grad(&theta, &opt.data).unwrap();

        // Assert
        let h = 1e-6;
        for k in 0..theta.len() {
            let mut up = theta.clone();
            let mut dn = theta.clone();
            up[k] += h;
            dn[k] -= h;
            let fd = (problem.value(&up, &opt.data).unwrap()
                - problem.value(&dn, &opt.data).unwrap())
                / (2.0 * h);
            assert!((fd - grad[k]).abs() < 1e-6, "k {k}: fd {fd} vs {}", grad[k]);
        }
    }

    #[test]
    fn adapter_uses_the_analytic_gradient() {
        let opt = ScheduleOptimizer::new(2.0, 0.0, 2).unwrap();
        let problem = SchedulingProblem::new(0.5, 0, None).unwrap();
        let adapter = ArgMinAdapter::new(&problem, &opt.data);
        let theta = array![0.5, 1.0];
        let via_adapter = adapter.gradient(&theta).unwrap();
        let direct = problem.grad(&theta, &opt.data).unwrap();
        assert_eq!(via_adapter, direct);
        assert_eq!(adapter.cost(&theta).unwrap(), problem.value(&theta, &opt.data).unwrap());
    }

    // Same cost, no analytic gradient: the adapter falls back to differences.
    struct CostOnly(SchedulingProblem);

    impl CostObjective for CostOnly {
        type Data = ServiceChain;

        fn value(&self, theta: &Theta, data: &ServiceChain) -> OptResult<f64> {
            self.0.value(theta, data)
        }

        fn check(&self, theta: &Theta, data: &ServiceChain) -> OptResult<()> {
            self.0.check(theta, data)
        }
    }

    #[test]
    // Purpose
    // -------
    // The adjoint gradient agrees with the adapter's finite-difference
    // fallback on a busy system with a non-exponential service.
    fn adjoint_gradient_agrees_with_difference_fallback() {
        // Arrange
        let opt = ScheduleOptimizer::new(1.8, 0.7, 4).unwrap();
        let analytic = SchedulingProblem::new(0.6, 1, None).unwrap();
        let numeric = CostOnly(analytic.clone());
        let theta = array![0.9, 0.1, -0.4];

        // Act
        let g_a = ArgMinAdapter::new(&analytic, &opt.data).gradient(&theta).unwrap();
        let g_n = ArgMinAdapter::new(&numeric, &opt.data).gradient(&theta).unwrap();

        // Assert
        for (a, n) in g_a.iter().zip(g_n.iter()) {
            assert!((a - n).abs() < 1e-5, "adjoint {a} vs differences {n}");
        }
    }

    #[test]
    fn default_guess_offsets_first_slot_by_waiting_clients() {
        assert_eq!(default_initial_guess(3, 0), array![1.5, 1.5, 1.5]);
        assert_eq!(default_initial_guess(2, 2), array![3.5, 1.5]);
        assert_eq!(default_initial_guess(0, 0).len(), 0);
    }

    #[test]
    // Purpose
    // -------
    // A converged run improves on the default starting schedule.
    fn optimized_cost_beats_the_initial_guess() {
        // Arrange
        let opt = ScheduleOptimizer::new(0.5, 0.0, 3).unwrap();
        let x0 = default_initial_guess(3, 0);
        let start = opt.cost(x0.view(), 0.5, 0).unwrap();

        // Act
        let out = opt.optimize(0.5, 0, None, &ScheduleOptions::default()).unwrap();

        // Assert
        assert!(out.converged);
        assert!(out.cost <= start);
        assert!(out.schedule.iter().all(|&x| x > 0.0));
        assert!((opt.cost(out.schedule.view(), 0.5, 0).unwrap() - out.cost).abs() < 1e-10);
    }

    #[test]
    fn wrong_guess_length_is_a_length_mismatch() {
        let opt = ScheduleOptimizer::new(1.0, 0.0, 3).unwrap();
        let guess = array![1.0, 1.0];
        assert_eq!(
            opt.optimize(0.5, 0, Some(guess.view()), &ScheduleOptions::default()),
            Err(ScheduleError::LengthMismatch { name: "initial_guess", expected: 3, actual: 2 })
        );
    }

    #[test]
    fn pre_cancelled_token_stops_before_solving() {
        let token = CancelToken::new();
        token.cancel();
        let options = ScheduleOptions::default().cancel_token(token);
        assert_eq!(
            optimize_schedule(0.5, 0.0, 0.5, 2, None, 0, &options),
            Err(ScheduleError::Cancelled { stage: Stage::Optimize })
        );
    }

    #[test]
    fn waiting_clients_at_horizon_are_rejected_up_front() {
        assert!(matches!(
            optimize_schedule(0.5, 0.0, 0.5, 2, None, 2, &ScheduleOptions::default()),
            Err(ScheduleError::InvalidParameter { name: "waiting_in_system", .. })
        ));
    }

    // Cancels the shared token on the `after`-th cost evaluation.
    struct CancelAfter {
        inner: SchedulingProblem,
        token: CancelToken,
        after: usize,
        calls: Cell<usize>,
    }

    impl CostObjective for CancelAfter {
        type Data = ServiceChain;

        fn value(&self, theta: &Theta, data: &ServiceChain) -> OptResult<f64> {
            let seen = self.calls.get() + 1;
            self.calls.set(seen);
            if seen >= self.after {
                self.token.cancel();
            }
            self.inner.value(theta, data)
        }

        fn check(&self, theta: &Theta, data: &ServiceChain) -> OptResult<()> {
            self.inner.check(theta, data)
        }

        fn grad(&self, theta: &Theta, data: &ServiceChain) -> OptResult<Grad> {
            self.inner.grad(theta, data)
        }
    }

    #[test]
    // Purpose
    // -------
    // A token fired while the solver is running stops it at the next cost
    // evaluation and surfaces as a cancellation, not as a solver failure.
    //
    // Expect
    // ------
    // `Cancelled { stage: Optimize }` with no evaluation past the one that
    // observed the token.
    fn token_fired_mid_run_cancels_the_solver() {
        // Arrange
        let opt = ScheduleOptimizer::new(0.5, 0.0, 4).unwrap();
        let token = CancelToken::new();
        let problem = CancelAfter {
            inner: SchedulingProblem::new(0.5, 0, Some(token.clone())).unwrap(),
            token: token.clone(),
            after: 3,
            calls: Cell::new(0),
        };
        let theta0 = default_initial_guess(4, 0).mapv(safe_softplus_inv);
        let solver = ScheduleOptions::default().cancel_token(token.clone()).effective_solver();

        // Act
        let err = minimize(&problem, theta0, &opt.data, &solver).unwrap_err();

        // Assert
        assert_eq!(err, OptError::Cancelled);
        assert_eq!(ScheduleError::from(err), ScheduleError::Cancelled { stage: Stage::Optimize });
        assert_eq!(problem.calls.get(), 3);
        assert!(token.is_cancelled());
    }

    #[test]
    // Purpose
    // -------
    // An expired deadline ends the run as non-converged with the best point
    // seen so far.
    fn expired_deadline_reports_timeout() {
        // Arrange
        let options = ScheduleOptions::default().timeout(Duration::from_nanos(1));

        // Act
        let err = optimize_schedule(0.5, 0.0, 0.5, 4, None, 0, &options);

        // Assert
        match err {
            Err(ScheduleError::OptimizationNonconvergence { status, schedule, cost, .. }) => {
                assert_eq!(status, "Timeout");
                assert_eq!(schedule.len(), 4);
                assert!(schedule.iter().all(|&x| x > 0.0));
                assert!(cost.is_finite());
            }
            other => panic!("expected a timeout, got {other:?}"),
        }
    }
}
