//! Routing engine: nearest-node/nearest-edge lookup, route cost queries, and
//! edge re-weighting for incident-aware re-routing.
//!
//! The engine adds no internal locking. Route queries are read-only and may
//! run concurrently with each other, but callers must serialize them against
//! the mutating `update_*` operations.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use h3o::Resolution;
use lru::LruCache;

use crate::astar::shortest_path;
use crate::geo::{haversine_m, point_to_segment_m, Compass, Location};
use crate::graph::Graph;

/// Band within which nearest-edge candidates count as tied (metres). Two
/// directions of the same road project to the same segment and must both be
/// caught; a float-keyed exact comparison would be brittle.
const TIE_EPSILON_M: f64 = 1e-6;

#[derive(Debug)]
pub struct RoutingEngine {
    graph: Graph,
}

impl RoutingEngine {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Nearest graph node to `at` by linear haversine scan. `None` on an
    /// empty graph.
    pub fn nearest_node(&self, at: Location) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for node in self.graph.nodes() {
            let d = haversine_m(at, node.location());
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((node.id, d));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Travel cost between the nearest graph nodes to the two endpoints.
    /// `-1.0` when the graph is empty, `f64::INFINITY` when disconnected.
    pub fn route(&self, from: Location, to: Location) -> f64 {
        let (Some(start), Some(goal)) = (self.nearest_node(from), self.nearest_node(to)) else {
            return -1.0;
        };
        shortest_path(&self.graph, start, goal).total_cost
    }

    /// Re-weight every edge with the given id (both directions of a two-way
    /// segment). Unknown ids are ignored.
    pub fn update_edge_weight(&mut self, id: usize, weight: f64) {
        self.graph.update_edge_weight(id, weight);
    }

    /// Re-weight the first directed edge matching `(from, to)` only.
    /// Returns whether such an edge existed.
    pub fn update_directed_edge(&mut self, from: usize, to: usize, weight: f64) -> bool {
        self.graph.update_directed_edge(from, to, weight)
    }

    /// Re-weight the edge(s) nearest to `at`, optionally filtered by
    /// heading. Every edge tied for the minimum distance is updated, so
    /// targeting a two-way road by coordinate hits both directions. Returns
    /// the number of edges touched.
    pub fn update_edge_near(&mut self, at: Location, weight: f64, dir: Compass) -> usize {
        let tied = self.nearest_edges(at, dir);
        for &edge_index in &tied {
            self.graph.set_weight_at(edge_index, weight);
        }
        tied.len()
    }

    /// Indices (into the edge vector) of all edges tied for minimum
    /// point-to-segment distance from `at`, after direction filtering.
    pub fn nearest_edges(&self, at: Location, dir: Compass) -> Vec<usize> {
        let mut min_distance = f64::INFINITY;
        let mut distances: Vec<Option<f64>> = Vec::with_capacity(self.graph.edge_count());

        for edge in self.graph.edges() {
            let (Some(from), Some(to)) = (self.graph.node(edge.from), self.graph.node(edge.to))
            else {
                distances.push(None);
                continue;
            };
            if !dir.matches_displacement(to.lat - from.lat, to.lon - from.lon) {
                distances.push(None);
                continue;
            }
            let d = point_to_segment_m(at, from.location(), to.location());
            if d < min_distance {
                min_distance = d;
            }
            distances.push(Some(d));
        }

        if min_distance.is_infinite() {
            return Vec::new();
        }
        distances
            .iter()
            .enumerate()
            .filter_map(|(index, d)| {
                d.filter(|d| (d - min_distance).abs() <= TIE_EPSILON_M)
                    .map(|_| index)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Route source seam
// ---------------------------------------------------------------------------

/// Distance oracle the matching engine scores candidates with. Implementors
/// must be `Send + Sync` so a source can be shared across worker threads.
///
/// Contract: negative when no network is available, infinite when the
/// endpoints are disconnected, otherwise the travel cost.
pub trait RouteSource: Send + Sync {
    fn route_cost(&self, from: Location, to: Location) -> f64;
}

impl RouteSource for RoutingEngine {
    fn route_cost(&self, from: Location, to: Location) -> f64 {
        self.route(from, to)
    }
}

/// Great-circle fallback source: no road network required.
#[derive(Debug, Default)]
pub struct GreatCircleRouteSource;

impl RouteSource for GreatCircleRouteSource {
    fn route_cost(&self, from: Location, to: Location) -> f64 {
        haversine_m(from, to)
    }
}

/// LRU-cached wrapper around any [`RouteSource`].
///
/// Keys are directional H3 cell pairs at the configured resolution, so
/// queries from anywhere within a cell share one entry. Endpoints that
/// cannot be indexed pass through uncached.
pub struct CachedRouteSource {
    inner: Box<dyn RouteSource>,
    resolution: Resolution,
    cache: Mutex<LruCache<(u64, u64), f64>>,
}

impl CachedRouteSource {
    pub fn new(inner: Box<dyn RouteSource>, capacity: usize, resolution: Resolution) -> Self {
        Self {
            inner,
            resolution,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }
}

impl RouteSource for CachedRouteSource {
    fn route_cost(&self, from: Location, to: Location) -> f64 {
        let (Some(a), Some(b)) = (from.cell(self.resolution), to.cell(self.resolution)) else {
            return self.inner.route_cost(from, to);
        };
        let key = (u64::from(a), u64::from(b));

        {
            let mut cache = match self.cache.lock() {
                Ok(guard) => guard,
                Err(_) => return self.inner.route_cost(from, to),
            };
            if let Some(&hit) = cache.get(&key) {
                return hit;
            }
        }

        let cost = self.inner.route_cost(from, to);
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, cost);
        }
        cost
    }
}
