//! adaptive_schedule — optimal appointment schedules with Python bindings.
//!
//! Purpose
//! -------
//! Serve as the crate root for Rust callers and as the PyO3 bridge that
//! exposes schedule optimization to Python via the `_adaptive_schedule`
//! extension module when the `python-bindings` feature is enabled.
//!
//! Key behaviors
//! -------------
//! - Re-export the core Rust modules (`scheduling` and `optimization`) as
//!   the public crate surface.
//! - Define the `AppointmentSchedule` `#[pyclass]`, the `optimize_schedule`
//!   and `plan_appointments` functions, and the `#[pymodule]` initializer.
//!
//! Invariants & assumptions
//! ------------------------
//! - All numerical work lives in the inner modules; this file performs only
//!   FFI glue, argument conversion and error mapping.
//! - `ScheduleError` values cross the boundary as `ValueError`.
//!
//! Downstream usage
//! ----------------
//! - Native Rust code depends on [`scheduling`] directly and ignores the PyO3
//!   items guarded by the `python-bindings` feature.
//! - The Python packaging layer imports `_adaptive_schedule` and wraps it in
//!   a thin facade.
pub mod optimization;
pub mod scheduling;
pub mod utils;

#[cfg(feature = "python-bindings")]
use pyo3::{prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::{
    scheduling::{
        core::options::default_tolerance,
        models::schedule::{ScheduleOutcome, optimize_schedule as optimize_schedule_rs},
        plan::{AppointmentPlan, ScheduleRequest, plan_appointments as plan_appointments_rs},
    },
    utils::{build_schedule_options, extract_initial_guess},
};

/// AppointmentSchedule — Python-facing result of a schedule optimization.
///
/// Holds interarrival times, the implied arrival times and the expected
/// cost, all in the units of the call that produced it (mean service times
/// for `optimize_schedule`, real time for `plan_appointments`).
#[cfg(feature = "python-bindings")]
#[pyclass(module = "adaptive_schedule", frozen)]
pub struct AppointmentSchedule {
    schedule: Vec<f64>,
    arrival_times: Vec<f64>,
    cost: f64,
    converged: bool,
    iterations: usize,
    status: String,
}

#[cfg(feature = "python-bindings")]
impl From<ScheduleOutcome> for AppointmentSchedule {
    fn from(out: ScheduleOutcome) -> Self {
        let mut total = 0.0;
        let arrival_times = out
            .schedule
            .iter()
            .map(|&x| {
                total += x;
                total
            })
            .collect();
        AppointmentSchedule {
            schedule: out.schedule.to_vec(),
            arrival_times,
            cost: out.cost,
            converged: out.converged,
            iterations: out.iterations,
            status: out.status,
        }
    }
}

#[cfg(feature = "python-bindings")]
impl From<AppointmentPlan> for AppointmentSchedule {
    fn from(plan: AppointmentPlan) -> Self {
        AppointmentSchedule {
            schedule: plan.interarrival.to_vec(),
            arrival_times: plan.arrival_times.to_vec(),
            cost: plan.cost,
            converged: true,
            iterations: plan.iterations,
            status: plan.status,
        }
    }
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl AppointmentSchedule {
    /// Interarrival times.
    #[getter]
    pub fn schedule(&self) -> Vec<f64> {
        self.schedule.clone()
    }

    /// Cumulative arrival times.
    #[getter]
    pub fn arrival_times(&self) -> Vec<f64> {
        self.arrival_times.clone()
    }

    /// Expected weighted idle plus waiting time.
    #[getter]
    pub fn cost(&self) -> f64 {
        self.cost
    }

    #[getter]
    pub fn converged(&self) -> bool {
        self.converged
    }

    #[getter]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    #[getter]
    pub fn status(&self) -> String {
        self.status.clone()
    }

    fn __repr__(&self) -> String {
        format!(
            "AppointmentSchedule(n={}, cost={:.6}, converged={})",
            self.schedule.len(),
            self.cost,
            self.converged
        )
    }
}

/// Optimal interarrival times in units of the mean service time.
///
/// `tol = None` uses the horizon-dependent default tolerance.
#[cfg(feature = "python-bindings")]
#[pyfunction]
#[pyo3(
    signature = (scv, elapsed, omega, horizon, initial_guess = None, wis = 0, tol = None,
                 max_iter = None),
    text_signature = "(scv, elapsed, omega, horizon, /, initial_guess=None, wis=0, tol=None, \
                      max_iter=None)"
)]
#[allow(clippy::too_many_arguments)]
pub fn optimize_schedule<'py>(
    py: Python<'py>, scv: f64, elapsed: f64, omega: f64, horizon: usize,
    initial_guess: Option<&Bound<'py, PyAny>>, wis: usize, tol: Option<f64>,
    max_iter: Option<usize>,
) -> PyResult<AppointmentSchedule> {
    let guess = extract_initial_guess(py, initial_guess)?;
    let options = build_schedule_options(tol, default_tolerance(horizon), max_iter)?;
    let outcome = py.allow_threads(|| {
        let guess = guess.as_ref().map(|g| g.view());
        optimize_schedule_rs(scv, elapsed, omega, horizon, guess, wis, &options)
    })?;
    Ok(outcome.into())
}

/// Appointment table in real time units for `clients` new clients.
#[cfg(feature = "python-bindings")]
#[pyfunction]
#[pyo3(
    signature = (mean, scv, omega, clients, wis = 0, elapsed = 0.0, tol = None, max_iter = None),
    text_signature = "(mean, scv, omega, clients, /, wis=0, elapsed=0.0, tol=None, max_iter=None)"
)]
#[allow(clippy::too_many_arguments)]
pub fn plan_appointments(
    py: Python<'_>, mean: f64, scv: f64, omega: f64, clients: usize, wis: usize, elapsed: f64,
    tol: Option<f64>, max_iter: Option<usize>,
) -> PyResult<AppointmentSchedule> {
    let request = ScheduleRequest { mean, scv, omega, clients, waiting_in_system: wis, elapsed };
    let options = build_schedule_options(tol, default_tolerance(request.horizon()), max_iter)?;
    let plan = py.allow_threads(|| plan_appointments_rs(&request, &options))?;
    Ok(plan.into())
}

/// _adaptive_schedule — PyO3 module initializer for the Python extension.
///
/// Invoked by Python when importing the compiled extension.
#[cfg(feature = "python-bindings")]
#[pymodule]
fn _adaptive_schedule<'py>(_py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    m.add_class::<AppointmentSchedule>()?;
    m.add_function(wrap_pyfunction!(optimize_schedule, m)?)?;
    m.add_function(wrap_pyfunction!(plan_appointments, m)?)?;
    Ok(())
}
