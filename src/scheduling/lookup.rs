//! Precomputed lookup — schedules cached by parameter bucket.
//!
//! Purpose
//! -------
//! Interactive front-ends often serve schedules from a table computed ahead
//! of time instead of optimizing on every request. [`ScheduleCache`] plays
//! that role in-process: requests are snapped to a bucket
//! ([`ScheduleKey`]) and a miss is filled by running the optimizer on the
//! bucket's canonical parameters, so a cached answer is exactly what a live
//! call on those parameters returns.
//!
//! Key behaviors
//! -------------
//! - SCV is bucketed to two decimals and ω to one decimal (nearest).
//! - Mean-normalized elapsed time is truncated onto a grid of
//!   [`ELAPSED_STEP`].
//! - Horizon and waiting clients are part of the key as-is.
//! - Precomputed tables can be loaded with [`ScheduleCache::insert`].
//! - An unbounded cache keeps every bucket it has solved until
//!   [`ScheduleCache::clear`]; [`ScheduleCache::with_capacity`] caps the
//!   entry count and evicts the oldest bucket first.
//!
//! Conventions
//! -----------
//! - The cache is owned by its caller and mutated through `&mut self`; share
//!   it across threads by wrapping it, not from inside.
//! - Cached schedules are in mean-service-time units, like the optimizer's.
use crate::scheduling::{
    core::{
        options::ScheduleOptions,
        validation::{validate_elapsed, validate_horizon, validate_scv},
    },
    errors::{ScheduleError, ScheduleResult},
    models::schedule::{ScheduleOutcome, optimize_schedule},
    plan::{AppointmentPlan, ScheduleRequest, plan_with},
};
use std::collections::{HashMap, VecDeque};
use tracing::trace;

/// Grid step for mean-normalized elapsed time.
pub const ELAPSED_STEP: f64 = 0.01;

/// Bucketed lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleKey {
    scv_centis: u64,
    omega_tenths: u8,
    elapsed_steps: u64,
    horizon: usize,
    wis: usize,
}

impl ScheduleKey {
    /// Snap raw parameters onto their bucket.
    ///
    /// # Errors
    /// - `InvalidParameter` if SCV or elapsed time is invalid, if the SCV
    ///   rounds to zero, or if ω rounds to 0 or 1 (outside the open unit
    ///   interval).
    /// - `InvalidParameter` for `horizon == 0` or `wis >= horizon`.
    pub fn bucket(
        scv: f64, omega: f64, horizon: usize, wis: usize, elapsed: f64,
    ) -> ScheduleResult<Self> {
        let scv = validate_scv(scv)?;
        let elapsed = validate_elapsed(elapsed)?;
        validate_horizon(horizon, wis)?;

        let scv_centis = (scv * 100.0).round();
        if scv_centis < 1.0 {
            return Err(ScheduleError::InvalidParameter {
                name: "scv",
                value: scv,
                reason: "rounds to zero at two decimals",
            });
        }
        let omega_tenths = (omega * 10.0).round();
        if !(omega_tenths >= 1.0 && omega_tenths <= 9.0) {
            return Err(ScheduleError::InvalidParameter {
                name: "omega",
                value: omega,
                reason: "must round to a value strictly between 0 and 1 at one decimal",
            });
        }
        let elapsed_steps = (elapsed / ELAPSED_STEP + 1e-9).floor();

        Ok(ScheduleKey {
            scv_centis: scv_centis as u64,
            omega_tenths: omega_tenths as u8,
            elapsed_steps: elapsed_steps as u64,
            horizon,
            wis,
        })
    }

    /// Canonical SCV of the bucket.
    pub fn scv(&self) -> f64 {
        self.scv_centis as f64 / 100.0
    }

    /// Canonical ω of the bucket.
    pub fn omega(&self) -> f64 {
        f64::from(self.omega_tenths) / 10.0
    }

    /// Canonical mean-normalized elapsed time of the bucket.
    pub fn elapsed(&self) -> f64 {
        self.elapsed_steps as f64 * ELAPSED_STEP
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn waiting_in_system(&self) -> usize {
        self.wis
    }
}

/// In-memory table of optimized schedules keyed by bucket.
#[derive(Debug, Clone, Default)]
pub struct ScheduleCache {
    entries: HashMap<ScheduleKey, ScheduleOutcome>,
    /// Keys in admission order, oldest first.
    order: VecDeque<ScheduleKey>,
    capacity: Option<usize>,
    options: ScheduleOptions,
}

impl ScheduleCache {
    /// Empty, unbounded cache whose misses are solved with `options`.
    pub fn new(options: ScheduleOptions) -> Self {
        ScheduleCache { entries: HashMap::new(), order: VecDeque::new(), capacity: None, options }
    }

    /// Empty cache holding at most `capacity` buckets.
    ///
    /// # Errors
    /// `InvalidParameter { name: "capacity", .. }` for a zero capacity.
    pub fn with_capacity(options: ScheduleOptions, capacity: usize) -> ScheduleResult<Self> {
        if capacity == 0 {
            return Err(ScheduleError::InvalidParameter {
                name: "capacity",
                value: 0.0,
                reason: "must hold at least one entry",
            });
        }
        Ok(ScheduleCache { capacity: Some(capacity), ..ScheduleCache::new(options) })
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Cached entry for `key`, without computing.
    pub fn get(&self, key: &ScheduleKey) -> Option<&ScheduleOutcome> {
        self.entries.get(key)
    }

    /// Store a precomputed schedule, replacing any previous entry.
    ///
    /// # Errors
    /// `LengthMismatch` unless the schedule has `horizon − wis` entries.
    pub fn insert(&mut self, key: ScheduleKey, outcome: ScheduleOutcome) -> ScheduleResult<()> {
        let expected = key.horizon - key.wis;
        if outcome.schedule.len() != expected {
            return Err(ScheduleError::LengthMismatch {
                name: "schedule",
                expected,
                actual: outcome.schedule.len(),
            });
        }
        self.admit(key, outcome);
        Ok(())
    }

    /// Store `outcome`, evicting the oldest buckets if a new key would
    /// exceed the capacity.
    fn admit(&mut self, key: ScheduleKey, outcome: ScheduleOutcome) -> &ScheduleOutcome {
        if !self.entries.contains_key(&key) {
            if let Some(capacity) = self.capacity {
                while self.entries.len() >= capacity {
                    let Some(oldest) = self.order.pop_front() else { break };
                    trace!(key = ?oldest, "schedule cache eviction");
                    self.entries.remove(&oldest);
                }
            }
            self.order.push_back(key);
        }
        self.entries.insert(key, outcome);
        &self.entries[&key]
    }

    /// Cached schedule for `key`, optimizing on the canonical parameters on
    /// a miss.
    pub fn get_or_compute(&mut self, key: ScheduleKey) -> ScheduleResult<&ScheduleOutcome> {
        if self.entries.contains_key(&key) {
            trace!(?key, "schedule cache hit");
            return Ok(&self.entries[&key]);
        }
        trace!(?key, "schedule cache miss");
        let outcome = optimize_schedule(
            key.scv(),
            key.elapsed(),
            key.omega(),
            key.horizon,
            None,
            key.wis,
            &self.options,
        )?;
        Ok(self.admit(key, outcome))
    }

    /// Bucket raw parameters and return the cached schedule.
    pub fn lookup(
        &mut self, scv: f64, omega: f64, horizon: usize, wis: usize, elapsed: f64,
    ) -> ScheduleResult<&ScheduleOutcome> {
        let key = ScheduleKey::bucket(scv, omega, horizon, wis, elapsed)?;
        self.get_or_compute(key)
    }

    /// [`plan_with`] backed by this cache.
    pub fn plan(&mut self, request: &ScheduleRequest) -> ScheduleResult<AppointmentPlan> {
        plan_with(request, |scv, elapsed, omega, horizon, wis| {
            self.lookup(scv, omega, horizon, wis, elapsed).cloned()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::cost_optimizer::FnEvalMap;
    use ndarray::{Array1, array};

    fn stored(schedule: Array1<f64>) -> ScheduleOutcome {
        ScheduleOutcome {
            schedule,
            cost: 1.25,
            converged: true,
            iterations: 3,
            status: "precomputed".into(),
            fn_evals: FnEvalMap::new(),
        }
    }

    #[test]
    // Purpose
    // -------
    // Nearby parameters share a bucket; the canonical values sit on the
    // bucket grid.
    fn nearby_parameters_share_a_bucket() {
        // Arrange / Act
        let a = ScheduleKey::bucket(0.504, 0.46, 4, 1, 0.129).unwrap();
        let b = ScheduleKey::bucket(0.496, 0.54, 4, 1, 0.121).unwrap();

        // Assert
        assert_eq!(a, b);
        assert_eq!(a.scv(), 0.5);
        assert_eq!(a.omega(), 0.5);
        assert!((a.elapsed() - 0.12).abs() < 1e-12);
        assert_ne!(a, ScheduleKey::bucket(0.5, 0.5, 4, 0, 0.12).unwrap());
    }

    #[test]
    fn elapsed_grid_points_map_to_themselves() {
        for steps in [0u64, 1, 7, 30, 250] {
            let u = steps as f64 * ELAPSED_STEP;
            let key = ScheduleKey::bucket(1.0, 0.5, 2, 0, u).unwrap();
            assert_eq!(key.elapsed_steps, steps, "u = {u}");
        }
    }

    #[test]
    fn buckets_outside_the_admissible_range_are_rejected() {
        assert!(matches!(
            ScheduleKey::bucket(0.004, 0.5, 2, 0, 0.0),
            Err(ScheduleError::InvalidParameter { name: "scv", .. })
        ));
        assert!(matches!(
            ScheduleKey::bucket(1.0, 0.97, 2, 0, 0.0),
            Err(ScheduleError::InvalidParameter { name: "omega", .. })
        ));
        assert!(matches!(
            ScheduleKey::bucket(1.0, 0.5, 2, 2, 0.0),
            Err(ScheduleError::InvalidParameter { name: "waiting_in_system", .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Preloaded entries are served without running the optimizer.
    fn preloaded_entries_are_served_as_is() {
        // Arrange
        let mut cache = ScheduleCache::default();
        let key = ScheduleKey::bucket(2.0, 0.3, 3, 1, 0.5).unwrap();
        cache.insert(key, stored(array![2.0, 1.0])).unwrap();

        // Act
        let hit = cache.lookup(2.001, 0.31, 3, 1, 0.505).unwrap();

        // Assert
        assert_eq!(hit.status, "precomputed");
        assert_eq!(cache.len(), 1);
        assert!(cache.insert(key, stored(array![1.0])).is_err());
    }

    #[test]
    fn plan_through_cache_scales_preloaded_schedule() {
        let mut cache = ScheduleCache::default();
        // Idle system: the plan asks for horizon − 1 = 2 gaps, no waiting.
        let key = ScheduleKey::bucket(0.5, 0.5, 2, 0, 0.0).unwrap();
        cache.insert(key, stored(array![1.0, 2.0])).unwrap();
        let request = ScheduleRequest {
            mean: 3.0,
            scv: 0.5,
            omega: 0.5,
            clients: 3,
            waiting_in_system: 0,
            elapsed: 0.0,
        };

        let plan = cache.plan(&request).unwrap();

        assert_eq!(plan.interarrival, array![0.0, 3.0, 6.0]);
        assert_eq!(plan.arrival_times, array![0.0, 3.0, 9.0]);
        assert!((plan.cost - 3.75).abs() < 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // A miss is filled from the canonical parameters and agrees with a live
    // call on those parameters.
    fn miss_matches_live_optimization_on_canonical_parameters() {
        let options = ScheduleOptions::default();
        let mut cache = ScheduleCache::new(options.clone());

        let cached = cache.lookup(1.004, 0.52, 2, 0, 0.0).unwrap().clone();
        let live = optimize_schedule(1.0, 0.0, 0.5, 2, None, 0, &options).unwrap();

        assert_eq!(cached.schedule, live.schedule);
        assert_eq!(cached.cost, live.cost);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    // Purpose
    // -------
    // A bounded cache stays within its capacity by dropping the oldest
    // bucket; replacing an existing bucket evicts nothing.
    //
    // Expect
    // ------
    // After three admissions into a two-entry cache only the last two
    // remain, and `clear` resets the admission order.
    fn bounded_cache_evicts_oldest_bucket_first() {
        // Arrange
        let mut cache = ScheduleCache::with_capacity(ScheduleOptions::default(), 2).unwrap();
        let keys = [0.5, 1.0, 2.0].map(|scv| ScheduleKey::bucket(scv, 0.5, 3, 1, 0.0).unwrap());

        // Act
        cache.insert(keys[0], stored(array![1.0, 1.0])).unwrap();
        cache.insert(keys[1], stored(array![1.0, 1.0])).unwrap();
        cache.insert(keys[0], stored(array![2.0, 2.0])).unwrap();
        cache.insert(keys[2], stored(array![3.0, 3.0])).unwrap();

        // Assert
        assert_eq!(cache.capacity(), Some(2));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&keys[0]).is_none());
        assert!(cache.get(&keys[1]).is_some());
        assert_eq!(cache.get(&keys[2]).unwrap().schedule, array![3.0, 3.0]);

        cache.clear();
        assert!(cache.is_empty());
        cache.insert(keys[0], stored(array![1.0, 1.0])).unwrap();
        cache.insert(keys[1], stored(array![1.0, 1.0])).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            ScheduleCache::with_capacity(ScheduleOptions::default(), 0),
            Err(ScheduleError::InvalidParameter { name: "capacity", .. })
        ));
        assert_eq!(ScheduleCache::default().capacity(), None);
    }
}
