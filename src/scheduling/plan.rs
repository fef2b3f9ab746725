//! Appointment plans — real-time schedules for a concrete request.
//!
//! Purpose
//! -------
//! Turn a request phrased in real time units (mean service time, elapsed
//! service of the current client, number of clients to book) into a table
//! of interarrival and arrival times. The optimizer itself works in units of
//! the mean service time; this layer normalizes on the way in and rescales
//! on the way out.
//!
//! Key behaviors
//! -------------
//! - The horizon covers the clients to book plus those already waiting.
//! - With nobody waiting and no service in progress (`elapsed == 0`,
//!   `waiting_in_system == 0`) the first client is booked at time zero and
//!   only the remaining `horizon − 1` gaps are optimized.
//! - Arrival times are cumulative sums of the interarrival times.
//! - The solver is pluggable through [`plan_with`], so precomputed tables
//!   ([`ScheduleCache`](crate::scheduling::lookup::ScheduleCache)) and live
//!   optimization share the same post-processing.
use crate::scheduling::{
    core::{
        moments::ServiceMoments,
        options::{ScheduleOptions, default_tolerance},
        validation::{validate_elapsed, validate_horizon, validate_omega},
    },
    errors::{ScheduleError, ScheduleResult},
    models::schedule::{ScheduleOutcome, optimize_schedule},
};
use ndarray::Array1;
use tracing::debug;

/// A scheduling request in real time units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleRequest {
    /// Mean service time.
    pub mean: f64,
    /// Squared coefficient of variation of the service time.
    pub scv: f64,
    /// Idle-time weight in `(0, 1)`.
    pub omega: f64,
    /// Clients to book.
    pub clients: usize,
    /// Clients already waiting, excluding the one in service.
    pub waiting_in_system: usize,
    /// Service already received by the client in service.
    pub elapsed: f64,
}

impl ScheduleRequest {
    /// Total horizon `clients + waiting_in_system`.
    pub fn horizon(&self) -> usize {
        self.clients + self.waiting_in_system
    }

    /// Elapsed time in units of the mean.
    pub fn normalized_elapsed(&self) -> f64 {
        self.elapsed / self.mean
    }

    /// Options with the horizon-dependent tolerance of [`default_tolerance`].
    pub fn default_options(&self) -> ScheduleResult<ScheduleOptions> {
        ScheduleOptions::with_tolerance(default_tolerance(self.horizon()))
    }

    /// Check every field before any numerical work.
    pub fn validate(&self) -> ScheduleResult<()> {
        ServiceMoments::new(self.mean, self.scv)?;
        validate_omega(self.omega)?;
        validate_elapsed(self.elapsed)?;
        if self.clients == 0 {
            return Err(ScheduleError::InvalidParameter {
                name: "clients",
                value: 0.0,
                reason: "must be at least 1",
            });
        }
        validate_horizon(self.horizon(), self.waiting_in_system)
    }
}

/// Interarrival and arrival times for the booked clients.
#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentPlan {
    /// Gaps between consecutive arrivals, real time units.
    pub interarrival: Array1<f64>,
    /// Arrival epochs measured from now.
    pub arrival_times: Array1<f64>,
    /// Expected cost in real time units.
    pub cost: f64,
    pub iterations: usize,
    pub status: String,
}

impl AppointmentPlan {
    fn from_unit_schedule(
        unit: Array1<f64>, unit_cost: f64, mean: f64, iterations: usize, status: String,
    ) -> Self {
        let interarrival = unit * mean;
        let mut total = 0.0;
        let arrival_times = interarrival.mapv(|x| {
            total += x;
            total
        });
        AppointmentPlan { interarrival, arrival_times, cost: unit_cost * mean, iterations, status }
    }

    /// `(client, interarrival, arrival)` rows, clients numbered from 1.
    pub fn rows(&self) -> impl Iterator<Item = (usize, f64, f64)> + '_ {
        self.interarrival
            .iter()
            .zip(self.arrival_times.iter())
            .enumerate()
            .map(|(i, (&x, &t))| (i + 1, x, t))
    }

    pub fn len(&self) -> usize {
        self.interarrival.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interarrival.is_empty()
    }
}

/// Plan appointments by optimizing live.
///
/// # Errors
/// Any validation, numerical or non-convergence error from
/// [`optimize_schedule`].
pub fn plan_appointments(
    request: &ScheduleRequest, options: &ScheduleOptions,
) -> ScheduleResult<AppointmentPlan> {
    plan_with(request, |scv, elapsed, omega, horizon, wis| {
        optimize_schedule(scv, elapsed, omega, horizon, None, wis, options)
    })
}

/// Plan appointments with a caller-supplied solver.
///
/// `solve(scv, elapsed, omega, horizon, wis)` receives mean-normalized
/// inputs and must return a schedule of `horizon − wis` gaps in the same
/// units.
pub fn plan_with<F>(request: &ScheduleRequest, mut solve: F) -> ScheduleResult<AppointmentPlan>
where
    F: FnMut(f64, f64, f64, usize, usize) -> ScheduleResult<ScheduleOutcome>,
{
    request.validate()?;
    let horizon = request.horizon();
    let wis = request.waiting_in_system;
    let u = request.normalized_elapsed();

    let plan = if u == 0.0 && wis == 0 {
        if horizon == 1 {
            let trivial = "Single client booked at zero".to_string();
            AppointmentPlan::from_unit_schedule(Array1::zeros(1), 0.0, request.mean, 0, trivial)
        } else {
            let out = solve(request.scv, u, request.omega, horizon - 1, 0)?;
            let mut unit = Array1::<f64>::zeros(horizon);
            unit.slice_mut(ndarray::s![1..]).assign(&out.schedule);
            AppointmentPlan::from_unit_schedule(
                unit,
                out.cost,
                request.mean,
                out.iterations,
                out.status,
            )
        }
    } else {
        let out = solve(request.scv, u, request.omega, horizon, wis)?;
        AppointmentPlan::from_unit_schedule(
            out.schedule,
            out.cost,
            request.mean,
            out.iterations,
            out.status,
        )
    };
    debug!(clients = request.clients, wis, cost = plan.cost, "planned appointments");
    Ok(plan)
}
