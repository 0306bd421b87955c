//! Entities, configuration, errors, and observability types for the
//! matching engine.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::time::{Duration, Instant};

use h3o::{CellIndex, Resolution};
use thiserror::Error;

use crate::geo::Location;

pub type RiderId = u64;
pub type DriverId = u64;

/// Lifecycle state shared by riders and drivers. Terminal states are never
/// observable through the registries: the entity is removed in the same
/// critical section that closes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Open,
    Matched,
    Cancelled,
    /// Riders only; drivers do not expire.
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct Rider {
    pub id: RiderId,
    /// Maximum price this rider will pay.
    pub bid: f64,
    pub location: Location,
    pub state: EntityState,
    pub posted_at: Instant,
    /// Drivers holding a live offer for this rider, nearest first.
    pub pending_drivers: Vec<DriverId>,
}

#[derive(Debug, Clone)]
pub struct Driver {
    pub id: DriverId,
    /// Minimum price this driver accepts.
    pub ask: f64,
    pub location: Location,
    pub state: EntityState,
    /// Riders with an outstanding offer to this driver, oldest first.
    pub inbox: Vec<RiderId>,
}

#[derive(Debug, Error, PartialEq)]
pub enum MatchError {
    #[error("entity {0} already exists")]
    AlreadyExists(u64),

    #[error("entity {0} not found")]
    NotFound(u64),

    /// The driver has no live offer for this rider.
    #[error("rider {rider} was not offered to driver {driver}")]
    NotOffered { driver: DriverId, rider: RiderId },

    #[error("entity {0} is no longer open")]
    AlreadyClosed(u64),

    /// The location cannot be placed in an H3 cell.
    #[error("location ({lat}, {lon}) cannot be indexed")]
    OutOfRange { lat: f64, lon: f64 },

    /// The engine has not been started; there is no worker pool to signal.
    #[error("matching engine is not running")]
    Uninitialized,
}

/// Tuning knobs for the matching engine.
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// H3 resolution of the driver index (resolution 9 is ~240m cells).
    pub resolution: Resolution,
    /// K-ring disk radius searched around a rider's cell.
    pub ring_radius: u32,
    /// Maximum live offers per rider.
    pub offer_limit: usize,
    /// Open riders older than this are expired by the timekeeper.
    pub rider_timeout: Duration,
    /// Sleep between timekeeper sweeps.
    pub sweep_period: Duration,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::Nine,
            ring_radius: 1,
            offer_limit: 5,
            rider_timeout: Duration::from_secs(300),
            sweep_period: Duration::from_secs(1),
        }
    }
}

/// Monotonic counters, readable without the data lock. `riders_processed`
/// ticks once per dequeued rider, making quiescence observable to tests and
/// monitors.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub riders_processed: AtomicU64,
    pub offers_emitted: AtomicU64,
    pub matches_committed: AtomicU64,
    pub riders_timed_out: AtomicU64,
    pub riders_cancelled: AtomicU64,
    pub drivers_cancelled: AtomicU64,
}

/// Point-in-time view of one rider.
#[derive(Debug, Clone)]
pub struct RiderSnapshot {
    pub id: RiderId,
    pub bid: f64,
    pub location: Location,
    pub pending_drivers: Vec<DriverId>,
}

/// Point-in-time view of one driver.
#[derive(Debug, Clone)]
pub struct DriverSnapshot {
    pub id: DriverId,
    pub ask: f64,
    pub location: Location,
    pub inbox: Vec<RiderId>,
}

/// Consistent view of the whole engine, taken under the critical section.
/// Entity lists are sorted by id.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub riders: Vec<RiderSnapshot>,
    pub drivers: Vec<DriverSnapshot>,
    pub drivers_by_cell: HashMap<CellIndex, Vec<DriverId>>,
}
