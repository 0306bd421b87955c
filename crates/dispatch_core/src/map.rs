//! OSM-style map data model and its JSON loader.
//!
//! Decoding PBF/XML map dumps is an external concern; this module consumes
//! the decoded node/way stream serialized as JSON and feeds it to the graph
//! builder.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("failed to read map file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse map file: {0}")]
    Parse(#[from] serde_json::Error),

    /// The file parsed but held no drivable road network.
    #[error("map contains no usable nodes or ways")]
    EmptyMap,

    #[error("way {way} references unknown node {node}")]
    UnknownNode { way: i64, node: i64 },
}

/// Highway classes the router will drive on; everything else is dropped at
/// graph-build time.
pub const DRIVABLE_HIGHWAYS: &[&str] = &[
    "motorway",
    "motorway_link",
    "trunk",
    "trunk_link",
    "primary",
    "primary_link",
    "secondary",
    "secondary_link",
    "tertiary",
    "tertiary_link",
    "unclassified",
    "residential",
    "living_street",
];

pub fn is_drivable(highway: &str) -> bool {
    DRIVABLE_HIGHWAYS.contains(&highway)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MapNode {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapWay {
    pub id: i64,
    /// Ordered node references along the way.
    pub nodes: Vec<i64>,
    pub highway: String,
    /// Speed limit in km/h; ways without one drive at the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxspeed: Option<f64>,
    /// Raw oneway tag; see [`MapWay::direction`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oneway: Option<String>,
}

/// Travel directions a way permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WayDirection {
    Forward,
    Backward,
    Bidirectional,
}

impl MapWay {
    /// `"yes"` / `"1"` restrict travel to node order, `"-1"` reverses it,
    /// anything else is two-way.
    pub fn direction(&self) -> WayDirection {
        match self.oneway.as_deref() {
            Some("yes") | Some("1") => WayDirection::Forward,
            Some("-1") => WayDirection::Backward,
            _ => WayDirection::Bidirectional,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapData {
    pub nodes: Vec<MapNode>,
    pub ways: Vec<MapWay>,
}

impl MapData {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, MapError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() || self.ways.is_empty()
    }
}
