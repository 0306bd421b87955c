//! Road-graph construction from map data.
//!
//! Three passes:
//!
//! 1. Find routing nodes: way endpoints plus nodes referenced more than once
//!    across the drivable ways.
//! 2. Walk each way, collapsing runs of intermediate nodes into a single
//!    edge between adjacent routing nodes whose weight is the accumulated
//!    segment travel time.
//! 3. Restrict the result to its largest weakly connected component.
//!
//! Each collapsed segment gets one dense id shared by both of its directed
//! edges, so an id-addressed weight update covers the whole two-way road.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::geo::haversine_m;
use crate::graph::Graph;
use crate::map::{is_drivable, MapData, MapError, MapNode, MapWay, WayDirection};

/// Assumed speed for ways without a usable `maxspeed` tag (km/h).
const DEFAULT_SPEED_KMH: f64 = 30.0;

fn speed_mps(way: &MapWay) -> f64 {
    let kmh = match way.maxspeed {
        Some(v) if v > 0.0 => v,
        _ => DEFAULT_SPEED_KMH,
    };
    kmh * 1000.0 / 3600.0
}

/// Build the routing graph for the drivable subset of `data`.
pub fn build_graph(data: &MapData) -> Result<Graph, MapError> {
    let ways: Vec<&MapWay> = data.ways.iter().filter(|w| is_drivable(&w.highway)).collect();
    let node_by_id: HashMap<i64, &MapNode> = data.nodes.iter().map(|n| (n.id, n)).collect();

    // Reference counts across drivable ways; shared nodes are intersections.
    let mut usage: HashMap<i64, u32> = HashMap::new();
    for way in &ways {
        for node_id in &way.nodes {
            *usage.entry(*node_id).or_insert(0) += 1;
        }
    }

    let mut routing_nodes: HashSet<i64> = HashSet::new();
    for way in &ways {
        if let (Some(first), Some(last)) = (way.nodes.first(), way.nodes.last()) {
            routing_nodes.insert(*first);
            routing_nodes.insert(*last);
        }
    }
    for (node_id, count) in &usage {
        if *count > 1 {
            routing_nodes.insert(*node_id);
        }
    }

    // Dense indices in first-encounter order over the ways, so the numbering
    // is stable across runs.
    let mut graph = Graph::new();
    let mut index_of: HashMap<i64, usize> = HashMap::new();
    for way in &ways {
        for node_id in &way.nodes {
            if !routing_nodes.contains(node_id) || index_of.contains_key(node_id) {
                continue;
            }
            let node = node_by_id.get(node_id).ok_or(MapError::UnknownNode {
                way: way.id,
                node: *node_id,
            })?;
            let idx = graph.node_count();
            // idx is the current node count, so add_node cannot fail
            let _ = graph.add_node(idx, node.lat, node.lon);
            index_of.insert(*node_id, idx);
        }
    }

    let mut next_segment_id = 0usize;
    for way in &ways {
        if way.nodes.len() < 2 {
            continue;
        }
        let mps = speed_mps(way);

        let mut prev_routing: Option<i64> = None;
        let mut acc_distance = 0.0;

        for pair in way.nodes.windows(2) {
            let (prev_id, curr_id) = (pair[0], pair[1]);
            let prev = node_by_id.get(&prev_id).ok_or(MapError::UnknownNode {
                way: way.id,
                node: prev_id,
            })?;
            let curr = node_by_id.get(&curr_id).ok_or(MapError::UnknownNode {
                way: way.id,
                node: curr_id,
            })?;
            if prev_routing.is_none() && routing_nodes.contains(&prev_id) {
                prev_routing = Some(prev_id);
            }
            acc_distance += haversine_m(
                crate::geo::Location::new(prev.lat, prev.lon),
                crate::geo::Location::new(curr.lat, curr.lon),
            );

            if routing_nodes.contains(&curr_id) {
                if let Some(prev_id) = prev_routing {
                    let travel_secs = acc_distance / mps;
                    let from = index_of[&prev_id];
                    let to = index_of[&curr_id];
                    let id = next_segment_id;
                    next_segment_id += 1;

                    let emit = match way.direction() {
                        WayDirection::Forward => vec![(from, to)],
                        WayDirection::Backward => vec![(to, from)],
                        WayDirection::Bidirectional => vec![(from, to), (to, from)],
                    };
                    for (a, b) in emit {
                        // endpoints come from index_of, so they are in range
                        let _ = graph.add_edge(id, a, b, travel_secs);
                    }
                }
                prev_routing = Some(curr_id);
                acc_distance = 0.0;
            }
        }
    }

    Ok(largest_component(&graph))
}

/// Restrict a graph to its largest weakly connected component, re-densifying
/// node indices and preserving edge ids so shared-id pairs stay paired.
pub fn largest_component(graph: &Graph) -> Graph {
    let n = graph.node_count();
    if n == 0 {
        return Graph::new();
    }

    // Undirected adjacency for weak connectivity.
    let mut undirected: Vec<Vec<usize>> = vec![Vec::new(); n];
    for edge in graph.edges() {
        undirected[edge.from].push(edge.to);
        undirected[edge.to].push(edge.from);
    }

    let mut visited = vec![false; n];
    let mut best: Vec<usize> = Vec::new();
    for start in 0..n {
        if visited[start] {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = VecDeque::from([start]);
        visited[start] = true;
        while let Some(node) = queue.pop_front() {
            component.push(node);
            for &next in &undirected[node] {
                if !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }
        if component.len() > best.len() {
            best = component;
        }
    }

    let mut old_to_new: HashMap<usize, usize> = HashMap::new();
    let mut filtered = Graph::new();
    for (new_idx, &old_idx) in best.iter().enumerate() {
        if let Some(node) = graph.node(old_idx) {
            // ids are dense in `best` order, so add_node cannot fail
            let _ = filtered.add_node(new_idx, node.lat, node.lon);
            old_to_new.insert(old_idx, new_idx);
        }
    }
    for edge in graph.edges() {
        if let (Some(&from), Some(&to)) = (old_to_new.get(&edge.from), old_to_new.get(&edge.to)) {
            let _ = filtered.add_edge(edge.id, from, to, edge.weight);
        }
    }
    filtered
}
