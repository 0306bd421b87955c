//! Worker pool internals: offer emission and the timekeeper sweep.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam::channel::{Receiver, RecvTimeoutError};

use super::engine::Shared;
use super::types::{EntityState, RiderId};

/// Loop of one matching worker: block on the queue, emit offers for each
/// dequeued rider. Exits when the queue disconnects or shutdown is flagged;
/// anything still queued at shutdown is abandoned.
pub(crate) fn run_matching_worker(shared: Arc<Shared>, queue: Receiver<RiderId>) {
    loop {
        let rider_id = match queue.recv() {
            Ok(id) => id,
            Err(_) => break,
        };
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        emit_offers(&shared, rider_id);
        shared.metrics.riders_processed.fetch_add(1, Ordering::Release);
    }
}

/// Candidate discovery and offer emission for one rider, in one critical
/// section: a driver scored here cannot be matched or cancelled before the
/// inbox append becomes visible.
fn emit_offers(shared: &Shared, rider_id: RiderId) {
    let mut state = shared.lock_state();

    let Some(rider) = state.riders.get(&rider_id) else {
        // cancelled or expired before a worker got to it
        return;
    };
    if rider.state != EntityState::Open {
        return;
    }
    let (bid, rider_location) = (rider.bid, rider.location);
    let Some(origin) = shared.geo.cell_for(rider_location) else {
        return;
    };

    let disk = shared.geo.grid_disk(origin, shared.config.ring_radius);
    let mut scored: Vec<(u64, f64)> = Vec::new();
    for driver_id in state.driver_index.drivers_in_cells(&disk) {
        let Some(driver) = state.drivers.get(&driver_id) else {
            continue;
        };
        if driver.state != EntityState::Open || driver.ask > bid {
            continue;
        }
        let cost = shared.routes.route_cost(rider_location, driver.location);
        if cost < 0.0 || !cost.is_finite() {
            tracing::debug!(rider = rider_id, driver = driver_id, "driver unreachable");
            continue;
        }
        scored.push((driver_id, cost));
    }

    // stable sort keeps discovery order among equidistant drivers
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));
    scored.truncate(shared.config.offer_limit);

    let chosen: Vec<u64> = scored.into_iter().map(|(id, _)| id).collect();
    for driver_id in &chosen {
        if let Some(driver) = state.drivers.get_mut(driver_id) {
            if !driver.inbox.contains(&rider_id) {
                driver.inbox.push(rider_id);
            }
        }
    }
    if let Some(rider) = state.riders.get_mut(&rider_id) {
        rider.pending_drivers = chosen.clone();
    }

    shared
        .metrics
        .offers_emitted
        .fetch_add(chosen.len() as u64, Ordering::Relaxed);
    tracing::debug!(rider = rider_id, offers = chosen.len(), "offers emitted");
}

/// Timekeeper: every sweep period, expire Open riders older than the
/// configured timeout. The scan collects ids under the lock; each expiry
/// then reacquires it, so per-rider cleanup never extends the scan's
/// critical section.
pub(crate) fn run_timekeeper(shared: Arc<Shared>, stop: Receiver<()>) {
    loop {
        match stop.recv_timeout(shared.config.sweep_period) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        let expired: Vec<RiderId> = {
            let state = shared.lock_state();
            state
                .riders
                .values()
                .filter(|r| {
                    r.state == EntityState::Open
                        && r.posted_at.elapsed() >= shared.config.rider_timeout
                })
                .map(|r| r.id)
                .collect()
        };

        for rider_id in expired {
            let mut state = shared.lock_state();
            if state.close_rider(rider_id, EntityState::TimedOut) {
                shared
                    .metrics
                    .riders_timed_out
                    .fetch_add(1, Ordering::Relaxed);
                tracing::debug!(rider = rider_id, "rider timed out");
            }
        }
    }
}
