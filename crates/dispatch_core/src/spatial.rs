//! Spatial operations: H3 indexing of open drivers and k-ring neighborhood
//! queries used for candidate discovery.
//!
//! Default resolution is 9 (~240m cell size), suitable for city-scale
//! matching.

use std::collections::HashMap;

use h3o::{CellIndex, Resolution};

use crate::geo::Location;

/// Wrapper for the H3 resolution the engine indexes at.
#[derive(Debug, Clone, Copy)]
pub struct GeoIndex {
    resolution: Resolution,
}

impl GeoIndex {
    pub fn new(resolution: Resolution) -> Self {
        Self { resolution }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn cell_for(&self, location: Location) -> Option<CellIndex> {
        location.cell(self.resolution)
    }

    /// All cells within `k` hex steps of `origin`, origin included.
    pub fn grid_disk(&self, origin: CellIndex, k: u32) -> Vec<CellIndex> {
        debug_assert_eq!(
            origin.resolution(),
            self.resolution,
            "origin resolution must match GeoIndex resolution"
        );
        origin.grid_disk::<Vec<_>>(k)
    }
}

impl Default for GeoIndex {
    fn default() -> Self {
        Self {
            resolution: Resolution::Nine,
        }
    }
}

/// H3 cell → open-driver-ids index with a reverse map for O(1) removal.
///
/// The matching engine guarantees a driver appears in at most one cell, the
/// one computed from its current location.
#[derive(Debug, Default)]
pub struct DriverIndex {
    drivers_by_cell: HashMap<CellIndex, Vec<u64>>,
    cell_by_driver: HashMap<u64, CellIndex>,
}

impl DriverIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, driver_id: u64, cell: CellIndex) {
        self.drivers_by_cell.entry(cell).or_default().push(driver_id);
        self.cell_by_driver.insert(driver_id, cell);
    }

    pub fn remove(&mut self, driver_id: u64) {
        if let Some(cell) = self.cell_by_driver.remove(&driver_id) {
            if let Some(ids) = self.drivers_by_cell.get_mut(&cell) {
                ids.retain(|&id| id != driver_id);
                if ids.is_empty() {
                    self.drivers_by_cell.remove(&cell);
                }
            }
        }
    }

    /// Driver ids across the given cells, in per-cell insertion order.
    pub fn drivers_in_cells(&self, cells: &[CellIndex]) -> Vec<u64> {
        let mut result = Vec::new();
        for cell in cells {
            if let Some(ids) = self.drivers_by_cell.get(cell) {
                result.extend(ids.iter().copied());
            }
        }
        result
    }

    pub fn cell_of(&self, driver_id: u64) -> Option<CellIndex> {
        self.cell_by_driver.get(&driver_id).copied()
    }

    pub fn len(&self) -> usize {
        self.cell_by_driver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cell_by_driver.is_empty()
    }

    pub fn cells(&self) -> &HashMap<CellIndex, Vec<u64>> {
        &self.drivers_by_cell
    }
}
