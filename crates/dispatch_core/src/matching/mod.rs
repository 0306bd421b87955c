//! Two-sided matching core: registries, offer lifecycle, worker pool.

pub mod engine;
pub mod types;
mod worker;

pub use engine::MatchingEngine;
pub use types::{
    Driver, DriverId, DriverSnapshot, EngineMetrics, EngineSnapshot, EntityState, MatchError,
    MatchingConfig, Rider, RiderId, RiderSnapshot,
};
