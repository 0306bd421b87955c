//! Directed weighted road graph.
//!
//! Nodes are densely indexed; edges live in one owned vector and each node's
//! adjacency list stores *indices* into it, so a weight update through the
//! graph is immediately visible to traversal without shared ownership.
//!
//! A two-way road segment is represented as two edges sharing one `id` with
//! swapped endpoints: updating by `id` re-weights both directions, updating
//! by `(from, to)` re-weights a single direction.

use thiserror::Error;

use crate::geo::Location;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// Node ids must equal the insertion index (dense 0..N numbering).
    #[error("node id {id} does not match the next free index {expected}")]
    InvalidId { id: usize, expected: usize },

    /// Edge endpoint referencing a node index that does not exist.
    #[error("edge endpoint {index} is outside the node range 0..{count}")]
    OutOfRange { index: usize, count: usize },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: usize,
    pub lat: f64,
    pub lon: f64,
    /// Indices into the graph's edge vector; every entry has `from == id`.
    pub edges: Vec<usize>,
}

impl Node {
    pub fn location(&self) -> Location {
        Location::new(self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Edge {
    /// Segment id, shared by both directions of a two-way road.
    pub id: usize,
    pub from: usize,
    pub to: usize,
    /// Travel time in seconds. Non-negative.
    pub weight: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node. `id` must equal the current node count.
    pub fn add_node(&mut self, id: usize, lat: f64, lon: f64) -> Result<(), GraphError> {
        if id != self.nodes.len() {
            return Err(GraphError::InvalidId {
                id,
                expected: self.nodes.len(),
            });
        }
        self.nodes.push(Node {
            id,
            lat,
            lon,
            edges: Vec::new(),
        });
        Ok(())
    }

    /// Append a directed edge and register it on its origin node.
    pub fn add_edge(
        &mut self,
        id: usize,
        from: usize,
        to: usize,
        weight: f64,
    ) -> Result<(), GraphError> {
        for index in [from, to] {
            if index >= self.nodes.len() {
                return Err(GraphError::OutOfRange {
                    index,
                    count: self.nodes.len(),
                });
            }
        }
        let edge_index = self.edges.len();
        self.edges.push(Edge {
            id,
            from,
            to,
            weight,
        });
        self.nodes[from].edges.push(edge_index);
        Ok(())
    }

    /// Overwrite the weight of every edge with the given id (both directions
    /// of a two-way segment). No-op when the id is unknown.
    pub fn update_edge_weight(&mut self, id: usize, new_weight: f64) {
        for edge in self.edges.iter_mut().filter(|e| e.id == id) {
            edge.weight = new_weight;
        }
    }

    /// Overwrite the first directed edge matching `(from, to)`. Returns
    /// whether such an edge existed.
    pub fn update_directed_edge(&mut self, from: usize, to: usize, new_weight: f64) -> bool {
        match self
            .edges
            .iter_mut()
            .find(|e| e.from == from && e.to == to)
        {
            Some(edge) => {
                edge.weight = new_weight;
                true
            }
            None => false,
        }
    }

    /// Overwrite one edge by its position in the edge vector.
    pub(crate) fn set_weight_at(&mut self, edge_index: usize, new_weight: f64) {
        if let Some(edge) = self.edges.get_mut(edge_index) {
            edge.weight = new_weight;
        }
    }

    /// `(to, weight)` for each outgoing edge of `idx`. Weights are read at
    /// call time; callers needing a stable view must serialize with writers.
    pub fn neighbors(&self, idx: usize) -> Vec<(usize, f64)> {
        let Some(node) = self.nodes.get(idx) else {
            return Vec::new();
        };
        node.edges
            .iter()
            .map(|&e| (self.edges[e].to, self.edges[e].weight))
            .collect()
    }

    pub fn node(&self, idx: usize) -> Option<&Node> {
        self.nodes.get(idx)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
