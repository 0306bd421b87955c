mod support;

use std::io::Write;

use dispatch_core::api::init_router;
use dispatch_core::map::{MapData, MapNode, MapWay};

use support::{wait_processed, BASE_LAT, BASE_LON};

fn node(id: i64, lat: f64, lon: f64) -> MapNode {
    MapNode { id, lat, lon }
}

fn way(id: i64, nodes: Vec<i64>, oneway: Option<&str>) -> MapWay {
    MapWay {
        id,
        nodes,
        highway: "residential".to_string(),
        maxspeed: None,
        oneway: oneway.map(str::to_string),
    }
}

fn write_map(data: &MapData) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    let json = serde_json::to_string(data).expect("serialize map");
    file.write_all(json.as_bytes()).expect("write map");
    file
}

/// A direct road from A to B plus a detour over C. A spur way through C
/// makes it an intersection, so the detour keeps its bend.
///
///        C --- D
///       / \
///      A---B
fn detour_map() -> MapData {
    MapData {
        nodes: vec![
            node(1, 43.690, -79.320), // A
            node(2, 43.690, -79.310), // B
            node(3, 43.700, -79.315), // C
            node(4, 43.700, -79.305), // D
        ],
        ways: vec![
            way(10, vec![1, 2], None),    // direct A-B
            way(11, vec![1, 3, 2], None), // detour A-C-B
            way(12, vec![3, 4], None),    // spur C-D
        ],
    }
}

#[test]
fn incident_reweighting_forces_the_detour() {
    let file = write_map(&detour_map());
    let mut handle = init_router(file.path()).expect("router");

    let baseline = handle.route_distance(43.690, -79.320, 43.690, -79.310);
    assert!(baseline.is_finite() && baseline > 0.0);

    // block the direct road at its midpoint, both directions
    handle.update_edge_by_coordinates(43.690, -79.315, baseline * 1000.0, "both");
    let rerouted = handle.route_distance(43.690, -79.320, 43.690, -79.310);
    assert!(
        rerouted > baseline,
        "detour {rerouted} should cost more than the direct road {baseline}"
    );
    assert!(rerouted.is_finite(), "the detour is still reachable");
}

#[test]
fn repeated_updates_are_idempotent_and_routes_deterministic() {
    let file = write_map(&detour_map());
    let mut handle = init_router(file.path()).expect("router");

    handle.update_edge_by_id(0, 777.0);
    let once = handle.route_distance(43.690, -79.320, 43.690, -79.310);
    handle.update_edge_by_id(0, 777.0);
    let twice = handle.route_distance(43.690, -79.320, 43.690, -79.310);
    assert_eq!(once, twice);
}

#[test]
fn oneway_roads_route_asymmetrically() {
    let data = MapData {
        nodes: vec![node(1, 43.690, -79.320), node(2, 43.690, -79.310)],
        ways: vec![way(10, vec![1, 2], Some("yes"))],
    };
    let file = write_map(&data);
    let handle = init_router(file.path()).expect("router");

    let forward = handle.route_distance(43.690, -79.320, 43.690, -79.310);
    let backward = handle.route_distance(43.690, -79.310, 43.690, -79.320);
    assert!(forward.is_finite() && forward > 0.0);
    assert!(backward.is_infinite(), "no path against the oneway");
}

#[test]
fn directed_update_by_nodes_leaves_the_reverse_direction() {
    let file = write_map(&detour_map());
    let mut handle = init_router(file.path()).expect("router");

    let forward_before = handle.route_distance(43.690, -79.320, 43.690, -79.310);
    let backward_before = handle.route_distance(43.690, -79.310, 43.690, -79.320);

    // the direct road is the first built segment: nodes 0 -> 1
    handle.update_edge_by_nodes(0, 1, forward_before * 1000.0);
    let forward_after = handle.route_distance(43.690, -79.320, 43.690, -79.310);
    let backward_after = handle.route_distance(43.690, -79.310, 43.690, -79.320);

    assert!(forward_after > forward_before);
    assert_eq!(backward_after, backward_before);
}

#[test]
fn matching_scores_candidates_by_road_distance() {
    // a straight road A - B - C, ~80m per hop so every driver stays inside
    // the rider's one-ring search disk; the rider waits at A, one driver at
    // B and one at C, so the B driver must be offered first
    let data = MapData {
        nodes: vec![
            node(1, BASE_LAT, BASE_LON),
            node(2, BASE_LAT, BASE_LON + 0.001),
            node(3, BASE_LAT, BASE_LON + 0.002),
        ],
        ways: vec![way(10, vec![1, 2], None), way(11, vec![2, 3], None)],
    };
    let file = write_map(&data);
    let handle = init_router(file.path()).expect("router");

    let engine = support::engine_with_source(handle.into_route_source());
    engine.start(1);
    engine
        .add_driver(1, 8.0, BASE_LAT, BASE_LON + 0.002)
        .expect("far driver");
    engine
        .add_driver(2, 8.0, BASE_LAT, BASE_LON + 0.001)
        .expect("near driver");
    engine.add_rider(101, 30.0, BASE_LAT, BASE_LON).expect("rider");
    wait_processed(&engine, 1);

    assert_eq!(
        engine.rider_pending_drivers(101),
        Some(vec![2, 1]),
        "offers are ordered by ascending road distance"
    );
    engine.stop();
}
