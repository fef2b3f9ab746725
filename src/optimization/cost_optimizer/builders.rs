//! cost_optimizer::builders — L-BFGS solver construction helpers.
//!
//! Purpose
//! -------
//! Hide Argmin’s generic wiring behind two small builders that apply the
//! crate-level [`SolverOptions`] (tolerances, memory size). The initial
//! parameter vector, iteration cap and timeout are runtime concerns applied
//! by the runner ([`run_lbfgs`](super::run::run_lbfgs)).
//!
//! Conventions
//! -----------
//! - The L-BFGS memory is `opts.lbfgs_mem` or [`DEFAULT_LBFGS_MEM`].
//! - Invalid tolerances rejected by Argmin surface as [`OptResult`] errors.
use argmin::solver::quasinewton::LBFGS;

use crate::optimization::{
    cost_optimizer::{
        traits::SolverOptions,
        types::{
            Cost, DEFAULT_LBFGS_MEM, Grad, HagerZhangLS, LbfgsHagerZhang, LbfgsMoreThuente,
            MoreThuenteLS, Theta,
        },
    },
    errors::OptResult,
};

/// Construct L-BFGS with a Hager–Zhang line search.
pub fn build_optimizer_hager_zhang(opts: &SolverOptions) -> OptResult<LbfgsHagerZhang> {
    let hager_zhang = HagerZhangLS::new();
    let mem = opts.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM);
    let lbfgs = LbfgsHagerZhang::new(hager_zhang, mem);
    configure_lbfgs(lbfgs, opts)
}

/// Construct L-BFGS with a More–Thuente line search.
pub fn build_optimizer_more_thuente(opts: &SolverOptions) -> OptResult<LbfgsMoreThuente> {
    let more_thuente = MoreThuenteLS::new();
    let mem = opts.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM);
    let lbfgs = LbfgsMoreThuente::new(more_thuente, mem);
    configure_lbfgs(lbfgs, opts)
}

/// Apply the optional gradient and cost-change tolerances to an L-BFGS solver.
///
/// `None` leaves Argmin’s own default in place.
pub fn configure_lbfgs<L>(
    mut solver: LBFGS<L, Theta, Grad, Cost>, opts: &SolverOptions,
) -> OptResult<LBFGS<L, Theta, Grad, Cost>> {
    if let Some(g) = opts.tols.tol_grad {
        solver = solver.with_tolerance_grad(g)?;
    }
    if let Some(c) = opts.tols.tol_cost {
        solver = solver.with_tolerance_cost(c)?;
    }
    Ok(solver)
}
