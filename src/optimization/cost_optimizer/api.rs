//! High-level entry point for minimizing a user-provided `CostObjective`.
//!
//! This selects an L-BFGS solver with either Hager–Zhang or More–Thuente line
//! search, wraps the objective in an `ArgMinAdapter`, and delegates the run to
//! `run_lbfgs`.
use crate::optimization::{
    cost_optimizer::{
        OptimOutcome, Theta,
        adapter::ArgMinAdapter,
        builders::{build_optimizer_hager_zhang, build_optimizer_more_thuente},
        run::run_lbfgs,
        traits::{CostObjective, LineSearcher, SolverOptions},
        validation::validate_theta,
    },
    errors::OptResult,
};

/// Minimize a cost `c(θ)` using L-BFGS with the chosen line search.
///
/// # Behavior
/// - Rejects non-finite initial guesses, then calls `f.check(theta0, data)`.
/// - Builds an L-BFGS solver according to `opts.line_searcher`.
/// - Calls `run_lbfgs`, which configures the executor and returns an
///   `OptimOutcome`.
///
/// # Errors
/// - Propagates any error from validation or `f.check`.
/// - Propagates builder and runtime errors (e.g., line search failures).
///
/// # Example
/// ```
/// use ndarray::array;
/// use adaptive_schedule::optimization::{
///     cost_optimizer::{minimize, CostObjective, SolverOptions, Theta},
///     errors::OptResult,
/// };
///
/// struct Bowl;
/// impl CostObjective for Bowl {
///     type Data = ();
///     fn value(&self, theta: &Theta, _: &()) -> OptResult<f64> {
///         Ok(theta.mapv(|t| (t - 2.0).powi(2)).sum())
///     }
///     fn check(&self, _: &Theta, _: &()) -> OptResult<()> {
///         Ok(())
///     }
/// }
///
/// let out = minimize(&Bowl, array![0.0, 5.0], &(), &SolverOptions::default())?;
/// assert!(out.converged);
/// assert!((out.theta_hat[0] - 2.0).abs() < 1e-3);
/// # Ok::<(), adaptive_schedule::optimization::errors::OptError>(())
/// ```
pub fn minimize<F: CostObjective>(
    f: &F, theta0: Theta, data: &F::Data, opts: &SolverOptions,
) -> OptResult<OptimOutcome> {
    validate_theta(&theta0)?;
    f.check(&theta0, data)?;
    let problem = ArgMinAdapter::new(f, data);
    match opts.line_searcher {
        LineSearcher::MoreThuente => {
            let solver = build_optimizer_more_thuente(opts)?;
            run_lbfgs(theta0, opts, problem, solver)
        }
        LineSearcher::HagerZhang => {
            let solver = build_optimizer_hager_zhang(opts)?;
            run_lbfgs(theta0, opts, problem, solver)
        }
    }
}
