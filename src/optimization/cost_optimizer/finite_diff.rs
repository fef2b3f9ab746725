//! cost_optimizer::finite_diff — forward-difference gradient fallback.
//!
//! [`ArgMinAdapter`](super::adapter::ArgMinAdapter) tries central differences
//! first for objectives without an analytic gradient; when those fail (an
//! evaluation error or a non-finite entry) it retries once here. The
//! objective closure cannot return a `Result`, so evaluation errors travel
//! through a shared `RefCell` slot and surface after differencing.
use crate::optimization::{
    cost_optimizer::{Grad, Theta, validation::validate_grad},
    errors::OptResult,
};
use argmin::core::Error;
use finitediff::FiniteDiff;
use std::cell::RefCell;

/// Forward-difference gradient of `func` at `theta`.
///
/// `func` must park any evaluation error in `closure_err` and return `NaN`;
/// the slot is cleared on entry.
///
/// # Errors
/// - The first error parked by `func`, converted into `OptError`.
/// - `GradientDimMismatch` / `InvalidGradient` from [`validate_grad`].
///
/// # Example
/// ```rust
/// # use std::cell::RefCell;
/// # use argmin::core::Error;
/// # use ndarray::array;
/// # use adaptive_schedule::optimization::cost_optimizer::{Theta, finite_diff::run_fd_diff};
/// let theta: Theta = array![0.5, 2.0];
/// let slot: RefCell<Option<Error>> = RefCell::new(None);
/// let idle = |x: &Theta| x.sum();
///
/// let grad = run_fd_diff(&theta, &idle, &slot)?;
/// assert!((grad[0] - 1.0).abs() < 1e-6);
/// # Ok::<(), adaptive_schedule::optimization::errors::OptError>(())
/// ```
pub fn run_fd_diff<G: Fn(&Theta) -> f64>(
    theta: &Theta, func: &G, closure_err: &RefCell<Option<Error>>,
) -> OptResult<Grad> {
    closure_err.replace(None);
    let fd_grad = theta.forward_diff(func);
    if let Some(err) = closure_err.take() {
        return Err(err.into());
    }
    validate_grad(&fd_grad, theta.len())?;
    Ok(fd_grad)
}
