//! A* shortest-path search over the road graph.
//!
//! Edge weights are travel times in seconds while the great-circle heuristic
//! is in metres, so the heuristic never steers the search: entries are
//! ordered by path cost and the heuristic only breaks ties between equal
//! costs. Path costs are therefore exact for any weight assignment.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::geo::haversine_m;
use crate::graph::Graph;

/// Outcome of a shortest-path query. An unreachable goal yields an empty
/// path and an infinite cost.
#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    /// Node indices from start to goal, inclusive. Empty when unreachable.
    pub path: Vec<usize>,
    pub total_cost: f64,
}

impl PathResult {
    fn unreachable() -> Self {
        Self {
            path: Vec::new(),
            total_cost: f64::INFINITY,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    node: usize,
    g_cost: f64,
    h_cost: f64,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering to make BinaryHeap a min-heap; the heuristic
        // only separates entries with equal path cost.
        other
            .g_cost
            .total_cmp(&self.g_cost)
            .then_with(|| other.h_cost.total_cmp(&self.h_cost))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

fn heuristic(graph: &Graph, from: usize, to: usize) -> f64 {
    match (graph.node(from), graph.node(to)) {
        (Some(a), Some(b)) => haversine_m(a.location(), b.location()),
        _ => 0.0,
    }
}

/// Shortest path from `start_idx` to `goal_idx`. Indices outside the graph
/// are treated as unreachable.
pub fn shortest_path(graph: &Graph, start_idx: usize, goal_idx: usize) -> PathResult {
    let n = graph.node_count();
    if start_idx >= n || goal_idx >= n {
        return PathResult::unreachable();
    }

    let mut g = vec![f64::INFINITY; n];
    let mut parent: Vec<Option<usize>> = vec![None; n];
    let mut closed = vec![false; n];
    let mut open = BinaryHeap::new();

    g[start_idx] = 0.0;
    open.push(OpenEntry {
        node: start_idx,
        g_cost: 0.0,
        h_cost: heuristic(graph, start_idx, goal_idx),
    });

    while let Some(current) = open.pop() {
        if closed[current.node] {
            continue;
        }
        closed[current.node] = true;

        if current.node == goal_idx {
            break;
        }

        for (neighbor, weight) in graph.neighbors(current.node) {
            if closed[neighbor] {
                continue;
            }
            let tentative = g[current.node] + weight;
            if tentative < g[neighbor] {
                g[neighbor] = tentative;
                parent[neighbor] = Some(current.node);
                open.push(OpenEntry {
                    node: neighbor,
                    g_cost: tentative,
                    h_cost: heuristic(graph, neighbor, goal_idx),
                });
            }
        }
    }

    if g[goal_idx].is_infinite() {
        return PathResult::unreachable();
    }

    let mut path = Vec::new();
    let mut current = Some(goal_idx);
    while let Some(node) = current {
        path.push(node);
        current = parent[node];
    }
    path.reverse();

    PathResult {
        path,
        total_cost: g[goal_idx],
    }
}
