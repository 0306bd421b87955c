//! The matching engine: authoritative registries, the single critical
//! section, and the worker pool lifecycle.
//!
//! All cross-entity transitions (offer emission, accept, cancel, timeout)
//! run under one mutex guarding both registries and the driver index, so no
//! intermediate state is ever observable and racing accepts for the same
//! rider are serialized.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam::channel::{unbounded, Sender};

use crate::geo::Location;
use crate::router::RouteSource;
use crate::spatial::{DriverIndex, GeoIndex};

use super::types::{
    Driver, DriverId, DriverSnapshot, EngineMetrics, EngineSnapshot, EntityState, MatchError,
    MatchingConfig, Rider, RiderId, RiderSnapshot,
};
use super::worker;

/// Registries plus the driver index, guarded together as one critical
/// section.
#[derive(Default)]
pub(crate) struct EngineState {
    pub(crate) riders: HashMap<RiderId, Rider>,
    pub(crate) drivers: HashMap<DriverId, Driver>,
    pub(crate) driver_index: DriverIndex,
}

impl EngineState {
    /// Terminal transition for a rider: retract its live offers, then drop
    /// it from the registry. Returns whether the rider existed.
    pub(crate) fn close_rider(&mut self, id: RiderId, terminal: EntityState) -> bool {
        let Some(mut rider) = self.riders.remove(&id) else {
            return false;
        };
        rider.state = terminal;
        for driver_id in &rider.pending_drivers {
            if let Some(driver) = self.drivers.get_mut(driver_id) {
                driver.inbox.retain(|&r| r != id);
            }
        }
        true
    }

    /// Post-match cleanup. Caller has already marked the pair Matched.
    /// Retracts every cross-reference to either entity and removes both.
    pub(crate) fn cleanup_after_match(&mut self, rider_id: RiderId, driver_id: DriverId) {
        self.driver_index.remove(driver_id);

        if let Some(rider) = self.riders.remove(&rider_id) {
            for other in rider.pending_drivers.iter().filter(|&&d| d != driver_id) {
                if let Some(driver) = self.drivers.get_mut(other) {
                    driver.inbox.retain(|&r| r != rider_id);
                }
            }
        }
        if let Some(driver) = self.drivers.remove(&driver_id) {
            for other in driver.inbox.iter().filter(|&&r| r != rider_id) {
                if let Some(rider) = self.riders.get_mut(other) {
                    rider.pending_drivers.retain(|&d| d != driver_id);
                }
            }
        }
    }
}

/// State shared between the engine facade and its worker threads.
pub(crate) struct Shared {
    pub(crate) state: Mutex<EngineState>,
    pub(crate) routes: Arc<dyn RouteSource>,
    pub(crate) config: MatchingConfig,
    pub(crate) geo: GeoIndex,
    pub(crate) shutdown: AtomicBool,
    pub(crate) metrics: EngineMetrics,
}

impl Shared {
    /// A poisoned mutex only means a worker panicked mid-section; the data
    /// is still the authoritative copy, so keep serving it.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Runtime {
    queue_tx: Sender<RiderId>,
    sweep_tx: Sender<()>,
    workers: Vec<JoinHandle<()>>,
    timekeeper: JoinHandle<()>,
}

pub struct MatchingEngine {
    shared: Arc<Shared>,
    runtime: Mutex<Option<Runtime>>,
}

impl MatchingEngine {
    pub fn new(routes: Arc<dyn RouteSource>) -> Self {
        Self::with_config(routes, MatchingConfig::default())
    }

    pub fn with_config(routes: Arc<dyn RouteSource>, config: MatchingConfig) -> Self {
        let geo = GeoIndex::new(config.resolution);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState::default()),
                routes,
                config,
                geo,
                shutdown: AtomicBool::new(false),
                metrics: EngineMetrics::default(),
            }),
            runtime: Mutex::new(None),
        }
    }

    /// Spawn the worker pool and the timekeeper. No-op when already
    /// running.
    pub fn start(&self, num_threads: usize) {
        let mut runtime = self.lock_runtime();
        if runtime.is_some() {
            return;
        }
        self.shared.shutdown.store(false, Ordering::Release);

        let (queue_tx, queue_rx) = unbounded::<RiderId>();
        let (sweep_tx, sweep_rx) = unbounded::<()>();

        let workers = (0..num_threads.max(1))
            .map(|i| {
                let shared = Arc::clone(&self.shared);
                let queue_rx = queue_rx.clone();
                std::thread::Builder::new()
                    .name(format!("match-worker-{i}"))
                    .spawn(move || worker::run_matching_worker(shared, queue_rx))
                    .expect("spawn matching worker")
            })
            .collect();

        let timekeeper = {
            let shared = Arc::clone(&self.shared);
            std::thread::Builder::new()
                .name("match-timekeeper".to_string())
                .spawn(move || worker::run_timekeeper(shared, sweep_rx))
                .expect("spawn timekeeper")
        };

        *runtime = Some(Runtime {
            queue_tx,
            sweep_tx,
            workers,
            timekeeper,
        });
        tracing::info!(workers = num_threads.max(1), "matching engine started");
    }

    /// Signal shutdown, abandon the queue, and join every thread. No-op
    /// when not running.
    pub fn stop(&self) {
        let Some(runtime) = self.lock_runtime().take() else {
            return;
        };
        self.shared.shutdown.store(true, Ordering::Release);
        drop(runtime.queue_tx);
        drop(runtime.sweep_tx);

        for handle in runtime.workers {
            if handle.join().is_err() {
                tracing::warn!("matching worker panicked");
            }
        }
        if runtime.timekeeper.join().is_err() {
            tracing::warn!("timekeeper panicked");
        }
        tracing::info!("matching engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.lock_runtime().is_some()
    }

    /// Register an open rider and hand it to the worker pool.
    pub fn add_rider(&self, id: RiderId, bid: f64, lat: f64, lon: f64) -> Result<(), MatchError> {
        let runtime = self.lock_runtime();
        let Some(runtime) = runtime.as_ref() else {
            return Err(MatchError::Uninitialized);
        };
        let location = Location::new(lat, lon);
        if location.cell(self.shared.config.resolution).is_none() {
            return Err(MatchError::OutOfRange { lat, lon });
        }

        {
            let mut state = self.shared.lock_state();
            if state.riders.contains_key(&id) {
                return Err(MatchError::AlreadyExists(id));
            }
            state.riders.insert(
                id,
                Rider {
                    id,
                    bid,
                    location,
                    state: EntityState::Open,
                    posted_at: Instant::now(),
                    pending_drivers: Vec::new(),
                },
            );
        }

        if runtime.queue_tx.send(id).is_err() {
            tracing::warn!(rider = id, "work queue closed; rider will not receive offers");
        }
        Ok(())
    }

    /// Register an open driver and place it in the spatial index.
    pub fn add_driver(&self, id: DriverId, ask: f64, lat: f64, lon: f64) -> Result<(), MatchError> {
        let location = Location::new(lat, lon);
        let Some(cell) = location.cell(self.shared.config.resolution) else {
            return Err(MatchError::OutOfRange { lat, lon });
        };

        let mut state = self.shared.lock_state();
        if state.drivers.contains_key(&id) {
            return Err(MatchError::AlreadyExists(id));
        }
        state.drivers.insert(
            id,
            Driver {
                id,
                ask,
                location,
                state: EntityState::Open,
                inbox: Vec::new(),
            },
        );
        state.driver_index.insert(id, cell);
        Ok(())
    }

    /// The atomic commit: first driver to accept an offered rider wins.
    /// Nothing is mutated on any failure path.
    pub fn driver_accept(&self, driver_id: DriverId, rider_id: RiderId) -> Result<(), MatchError> {
        let mut state = self.shared.lock_state();

        let driver = state
            .drivers
            .get(&driver_id)
            .ok_or(MatchError::NotFound(driver_id))?;
        let rider = state
            .riders
            .get(&rider_id)
            .ok_or(MatchError::NotFound(rider_id))?;
        if !driver.inbox.contains(&rider_id) {
            return Err(MatchError::NotOffered {
                driver: driver_id,
                rider: rider_id,
            });
        }
        if driver.state != EntityState::Open {
            return Err(MatchError::AlreadyClosed(driver_id));
        }
        if rider.state != EntityState::Open {
            return Err(MatchError::AlreadyClosed(rider_id));
        }

        if let Some(driver) = state.drivers.get_mut(&driver_id) {
            driver.state = EntityState::Matched;
        }
        if let Some(rider) = state.riders.get_mut(&rider_id) {
            rider.state = EntityState::Matched;
        }
        state.cleanup_after_match(rider_id, driver_id);

        self.shared
            .metrics
            .matches_committed
            .fetch_add(1, Ordering::Relaxed);
        tracing::info!(driver = driver_id, rider = rider_id, "match committed");
        Ok(())
    }

    /// Remove a driver and retract its offers. Silently idempotent.
    pub fn driver_cancel(&self, id: DriverId) {
        let mut state = self.shared.lock_state();
        let Some(mut driver) = state.drivers.remove(&id) else {
            return;
        };
        driver.state = EntityState::Cancelled;
        state.driver_index.remove(id);
        for rider_id in &driver.inbox {
            if let Some(rider) = state.riders.get_mut(rider_id) {
                rider.pending_drivers.retain(|&d| d != id);
            }
        }
        self.shared
            .metrics
            .drivers_cancelled
            .fetch_add(1, Ordering::Relaxed);
        tracing::debug!(driver = id, "driver cancelled");
    }

    /// Remove a rider and sweep it out of every inbox. Silently idempotent.
    pub fn rider_cancel(&self, id: RiderId) {
        let mut state = self.shared.lock_state();
        if state.close_rider(id, EntityState::Cancelled) {
            self.shared
                .metrics
                .riders_cancelled
                .fetch_add(1, Ordering::Relaxed);
            tracing::debug!(rider = id, "rider cancelled");
        }
    }

    /// Consistent view of registries and index, for inspection and tests.
    pub fn snapshot(&self) -> EngineSnapshot {
        let state = self.shared.lock_state();
        let mut riders: Vec<RiderSnapshot> = state
            .riders
            .values()
            .map(|r| RiderSnapshot {
                id: r.id,
                bid: r.bid,
                location: r.location,
                pending_drivers: r.pending_drivers.clone(),
            })
            .collect();
        riders.sort_by_key(|r| r.id);
        let mut drivers: Vec<DriverSnapshot> = state
            .drivers
            .values()
            .map(|d| DriverSnapshot {
                id: d.id,
                ask: d.ask,
                location: d.location,
                inbox: d.inbox.clone(),
            })
            .collect();
        drivers.sort_by_key(|d| d.id);
        EngineSnapshot {
            riders,
            drivers,
            drivers_by_cell: state.driver_index.cells().clone(),
        }
    }

    pub fn rider_pending_drivers(&self, id: RiderId) -> Option<Vec<DriverId>> {
        let state = self.shared.lock_state();
        state.riders.get(&id).map(|r| r.pending_drivers.clone())
    }

    pub fn driver_inbox(&self, id: DriverId) -> Option<Vec<RiderId>> {
        let state = self.shared.lock_state();
        state.drivers.get(&id).map(|d| d.inbox.clone())
    }

    pub fn rider_count(&self) -> usize {
        self.shared.lock_state().riders.len()
    }

    pub fn driver_count(&self) -> usize {
        self.shared.lock_state().drivers.len()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.shared.metrics
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.shared.config
    }

    fn lock_runtime(&self) -> MutexGuard<'_, Option<Runtime>> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for MatchingEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::GreatCircleRouteSource;

    fn engine() -> MatchingEngine {
        MatchingEngine::new(Arc::new(GreatCircleRouteSource))
    }

    #[test]
    fn add_rider_before_start_is_rejected() {
        let engine = engine();
        assert_eq!(
            engine.add_rider(1, 30.0, 43.690, -79.320),
            Err(MatchError::Uninitialized)
        );
    }

    #[test]
    fn duplicate_driver_is_rejected() {
        let engine = engine();
        engine.add_driver(1, 10.0, 43.690, -79.320).expect("driver");
        assert_eq!(
            engine.add_driver(1, 12.0, 43.691, -79.321),
            Err(MatchError::AlreadyExists(1))
        );
        assert_eq!(engine.driver_count(), 1);
    }

    #[test]
    fn unindexable_location_is_rejected() {
        let engine = engine();
        let err = engine.add_driver(1, 10.0, 95.0, 0.0).expect_err("bad lat");
        assert!(matches!(err, MatchError::OutOfRange { .. }));
    }

    #[test]
    fn accept_of_missing_entities_reports_which_one() {
        let engine = engine();
        assert_eq!(engine.driver_accept(1, 101), Err(MatchError::NotFound(1)));
        engine.add_driver(1, 10.0, 43.690, -79.320).expect("driver");
        assert_eq!(
            engine.driver_accept(1, 101),
            Err(MatchError::NotFound(101))
        );
        // the failed accepts left the driver untouched
        assert_eq!(engine.driver_inbox(1), Some(vec![]));
        assert_eq!(engine.driver_count(), 1);
    }

    #[test]
    fn driver_cancel_is_idempotent_and_restores_initial_state() {
        let engine = engine();
        engine.add_driver(7, 10.0, 43.690, -79.320).expect("driver");
        engine.driver_cancel(7);
        engine.driver_cancel(7);
        let snapshot = engine.snapshot();
        assert!(snapshot.drivers.is_empty());
        assert!(snapshot.drivers_by_cell.is_empty());
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let engine = engine();
        engine.start(2);
        engine.start(4);
        assert!(engine.is_running());
        engine.stop();
        engine.stop();
        assert!(!engine.is_running());
        // restart works after a full stop
        engine.start(1);
        assert!(engine.is_running());
        engine.stop();
    }
}
