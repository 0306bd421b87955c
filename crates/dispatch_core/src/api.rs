//! Boundary API: an explicit router handle instead of a process-global
//! engine. `init_router` loads a map file, builds the road graph, and hands
//! back the handle every later call goes through.

use std::path::Path;
use std::sync::Arc;

use crate::builder::build_graph;
use crate::geo::{Compass, Location};
use crate::map::{MapData, MapError};
use crate::router::{RouteSource, RoutingEngine};

/// Load a JSON map file and build a ready-to-query routing engine. Fails
/// with [`MapError::EmptyMap`] when the file holds no drivable network.
pub fn init_router(path: impl AsRef<Path>) -> Result<RouterHandle, MapError> {
    let data = MapData::from_json_file(path)?;
    if data.is_empty() {
        return Err(MapError::EmptyMap);
    }
    let graph = build_graph(&data)?;
    if graph.is_empty() {
        return Err(MapError::EmptyMap);
    }
    tracing::info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "road graph ready"
    );
    Ok(RouterHandle {
        engine: RoutingEngine::new(graph),
    })
}

/// Owning handle over a built routing engine.
#[derive(Debug)]
pub struct RouterHandle {
    engine: RoutingEngine,
}

impl RouterHandle {
    pub fn from_engine(engine: RoutingEngine) -> Self {
        Self { engine }
    }

    /// Route cost between two coordinate pairs; unit matches the edge
    /// weights (seconds for built maps).
    pub fn route_distance(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        self.engine
            .route(Location::new(lat1, lon1), Location::new(lat2, lon2))
    }

    /// Re-weight the nearest edge(s) to a coordinate. The direction string
    /// is case-insensitive; unknown values fall back to `BOTH`.
    pub fn update_edge_by_coordinates(&mut self, lat: f64, lon: f64, weight: f64, dir: &str) {
        let touched =
            self.engine
                .update_edge_near(Location::new(lat, lon), weight, Compass::parse(dir));
        if touched == 0 {
            tracing::warn!(lat, lon, dir, "no edge matched the coordinate update");
        }
    }

    pub fn update_edge_by_id(&mut self, id: usize, weight: f64) {
        self.engine.update_edge_weight(id, weight);
    }

    pub fn update_edge_by_nodes(&mut self, from: usize, to: usize, weight: f64) {
        self.engine.update_directed_edge(from, to, weight);
    }

    pub fn engine(&self) -> &RoutingEngine {
        &self.engine
    }

    /// Consume the handle and share its engine as a matching-side distance
    /// oracle. Edge updates are no longer possible afterwards; matching
    /// runs against a read-only network.
    pub fn into_route_source(self) -> Arc<dyn RouteSource> {
        Arc::new(self.engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_map(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(json.as_bytes()).expect("write map");
        file
    }

    const TWO_NODE_MAP: &str = r#"{
        "nodes": [
            {"id": 1, "lat": 43.690, "lon": -79.320},
            {"id": 2, "lat": 43.690, "lon": -79.310}
        ],
        "ways": [
            {"id": 10, "nodes": [1, 2], "highway": "residential"}
        ]
    }"#;

    #[test]
    fn init_router_builds_from_a_json_map() {
        let file = write_map(TWO_NODE_MAP);
        let handle = init_router(file.path()).expect("router");
        let cost = handle.route_distance(43.690, -79.320, 43.690, -79.310);
        assert!(cost > 0.0 && cost.is_finite());
    }

    #[test]
    fn init_router_rejects_missing_files() {
        let err = init_router("/nonexistent/map.json").expect_err("missing file");
        assert!(matches!(err, MapError::Io(_)));
    }

    #[test]
    fn init_router_rejects_undrivable_maps() {
        let file = write_map(
            r#"{"nodes": [{"id": 1, "lat": 0.0, "lon": 0.0}], "ways": []}"#,
        );
        let err = init_router(file.path()).expect_err("no ways");
        assert!(matches!(err, MapError::EmptyMap));
    }

    #[test]
    fn coordinate_update_with_unknown_direction_defaults_to_both() {
        let file = write_map(TWO_NODE_MAP);
        let mut handle = init_router(file.path()).expect("router");
        let before = handle.route_distance(43.690, -79.320, 43.690, -79.310);
        handle.update_edge_by_coordinates(43.690, -79.315, before * 10.0, "sideways");
        let after = handle.route_distance(43.690, -79.320, 43.690, -79.310);
        assert!(after > before);
    }
}
