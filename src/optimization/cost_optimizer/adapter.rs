//! Adapter that exposes a `CostObjective` as an `argmin` problem.
//!
//! The cost is minimized as-is (no sign flip). Objectives without an analytic
//! gradient get central differences, then forward differences if those fail.
use std::cell::RefCell;

use crate::optimization::{
    cost_optimizer::{
        finite_diff::run_fd_diff,
        traits::CostObjective,
        types::{Cost, Grad, Theta},
        validation::validate_grad,
    },
    errors::OptError,
};
use argmin::core::{CostFunction, Error, Gradient};
use finitediff::FiniteDiff;

/// Bridges a user `CostObjective` to `argmin`'s `CostFunction` and `Gradient`.
#[derive(Debug, Clone)]
pub struct ArgMinAdapter<'a, F: CostObjective> {
    pub f: &'a F,
    pub data: &'a F::Data,
}

impl<'a, F: CostObjective> CostFunction for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Output = Cost;

    /// Evaluate the cost `c(θ)`.
    ///
    /// # Errors
    /// - Propagates any `OptError` from the objective’s `value` via `?`.
    /// - Returns `NonFiniteCost` if the value is not finite.
    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        let output = self.f.value(theta, self.data)?;
        if !output.is_finite() {
            return Err((OptError::NonFiniteCost { value: output }).into());
        }
        Ok(output)
    }
}

impl<'a, F: CostObjective> Gradient for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Gradient = Grad;

    /// Evaluate the gradient of the cost at `θ`.
    ///
    /// Behavior:
    /// - If the objective implements `grad(θ, data)`, validate and return it.
    /// - Otherwise compute a finite-difference gradient of the cost:
    ///   - central differences first;
    ///   - if any evaluation failed (captured via `closure_err`) or the result
    ///     is non-finite, retry once with forward differences.
    ///
    /// The FD closure must return `f64`, so errors are captured in
    /// `closure_err` and the closure returns `NaN`.
    fn gradient(&self, theta: &Self::Param) -> Result<Self::Gradient, Error> {
        let dim = theta.len();
        match self.f.grad(theta, self.data) {
            Ok(g) => {
                validate_grad(&g, dim)?;
                Ok(g)
            }
            Err(OptError::GradientNotImplemented) => {
                let closure_err: RefCell<Option<Error>> = RefCell::new(None);
                let cost_func = |theta: &Theta| -> f64 {
                    match self.cost(theta) {
                        Ok(val) => val,
                        Err(e) => {
                            let mut slot = closure_err.borrow_mut();
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            f64::NAN
                        }
                    }
                };
                let fd_grad = theta.central_diff(&cost_func);
                if closure_err.borrow().is_some() || validate_grad(&fd_grad, dim).is_err() {
                    return Ok(run_fd_diff(theta, &cost_func, &closure_err)?);
                }
                Ok(fd_grad)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<'a, F: CostObjective> ArgMinAdapter<'a, F> {
    /// Construct a new adapter over a user `CostObjective` and its data.
    pub fn new(f: &'a F, data: &'a F::Data) -> Self {
        Self { f, data }
    }
}
