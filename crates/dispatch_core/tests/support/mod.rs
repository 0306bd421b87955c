//! Shared helpers for integration tests: engine construction, quiescence
//! polling, and whole-engine consistency checks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dispatch_core::matching::{MatchingConfig, MatchingEngine};
use dispatch_core::router::{GreatCircleRouteSource, RouteSource};

/// Base coordinate used across matching tests (East York, Toronto).
pub const BASE_LAT: f64 = 43.690;
pub const BASE_LON: f64 = -79.320;

/// Engine over straight-line distances. The rider timeout is long enough
/// that nothing expires mid-test; timekeeper tests use [`timeout_engine`].
pub fn test_engine() -> MatchingEngine {
    engine_with_source(Arc::new(GreatCircleRouteSource))
}

pub fn engine_with_source(routes: Arc<dyn RouteSource>) -> MatchingEngine {
    let config = MatchingConfig {
        rider_timeout: Duration::from_secs(60),
        ..MatchingConfig::default()
    };
    MatchingEngine::with_config(routes, config)
}

/// Engine whose riders expire in test time.
pub fn timeout_engine() -> MatchingEngine {
    let config = MatchingConfig {
        rider_timeout: Duration::from_millis(400),
        sweep_period: Duration::from_millis(50),
        ..MatchingConfig::default()
    };
    MatchingEngine::with_config(Arc::new(GreatCircleRouteSource), config)
}

/// Poll `pred` every 10ms until it holds or the deadline passes; returns
/// the final result.
pub fn wait_until(deadline: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    pred()
}

/// Block until the workers have dequeued `n` riders in total.
pub fn wait_processed(engine: &MatchingEngine, n: u64) {
    let done = wait_until(Duration::from_secs(5), || {
        engine
            .metrics()
            .riders_processed
            .load(std::sync::atomic::Ordering::Acquire)
            >= n
    });
    assert!(done, "workers did not process {n} riders in time");
}

/// Assert every cross-registry invariant at a quiescent point: index and
/// registry agree, offers are reciprocal and price-bounded, and pending
/// lists respect the offer limit.
pub fn assert_consistent(engine: &MatchingEngine) {
    let snapshot = engine.snapshot();
    let config = engine.config();

    let mut indexed: Vec<u64> = snapshot
        .drivers_by_cell
        .values()
        .flatten()
        .copied()
        .collect();
    indexed.sort_unstable();
    let registry: Vec<u64> = snapshot.drivers.iter().map(|d| d.id).collect();
    assert_eq!(indexed, registry, "driver index and registry diverge");

    for driver in &snapshot.drivers {
        let occurrences = snapshot
            .drivers_by_cell
            .values()
            .filter(|ids| ids.contains(&driver.id))
            .count();
        assert_eq!(occurrences, 1, "driver {} appears in {occurrences} cells", driver.id);
        let cell = driver
            .location
            .cell(config.resolution)
            .expect("driver location must index");
        assert!(
            snapshot
                .drivers_by_cell
                .get(&cell)
                .is_some_and(|ids| ids.contains(&driver.id)),
            "driver {} is not indexed under its own cell",
            driver.id
        );
    }

    for rider in &snapshot.riders {
        assert!(
            rider.pending_drivers.len() <= config.offer_limit,
            "rider {} exceeds the offer limit",
            rider.id
        );
        for driver_id in &rider.pending_drivers {
            if let Some(driver) = snapshot.drivers.iter().find(|d| d.id == *driver_id) {
                assert!(
                    driver.inbox.contains(&rider.id),
                    "pending driver {driver_id} lost rider {}",
                    rider.id
                );
                assert!(
                    driver.ask <= rider.bid,
                    "offer violates the price bound: ask {} > bid {}",
                    driver.ask,
                    rider.bid
                );
            }
        }
    }

    for driver in &snapshot.drivers {
        for rider_id in &driver.inbox {
            let rider = snapshot.riders.iter().find(|r| r.id == *rider_id);
            assert!(
                rider.is_some(),
                "driver {} inbox holds unregistered rider {rider_id}",
                driver.id
            );
            assert!(
                rider.is_some_and(|r| r.pending_drivers.contains(&driver.id)),
                "offer to driver {} is not reciprocated by rider {rider_id}",
                driver.id
            );
        }
    }
}
