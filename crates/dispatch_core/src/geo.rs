//! Geographic primitives: WGS-84 locations, great-circle distance,
//! point-to-segment projection, and compass-octant direction filters.

use h3o::{CellIndex, LatLng, Resolution};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A point on the Earth's surface in WGS-84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// H3 cell containing this location at the given resolution, or `None`
    /// when the coordinates fall outside the WGS-84 domain.
    pub fn cell(&self, resolution: Resolution) -> Option<CellIndex> {
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lon) {
            return None;
        }
        LatLng::new(self.lat, self.lon)
            .ok()
            .map(|ll| ll.to_cell(resolution))
    }
}

/// Great-circle distance between two locations in metres.
pub fn haversine_m(a: Location, b: Location) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Project a location onto a local equirectangular x/y plane (metres).
/// Only valid for comparing points that are close together, which is all the
/// nearest-edge search needs.
fn to_local_xy(loc: Location) -> (f64, f64) {
    let x = loc.lon.to_radians() * EARTH_RADIUS_M * loc.lat.to_radians().cos();
    let y = loc.lat.to_radians() * EARTH_RADIUS_M;
    (x, y)
}

/// Perpendicular distance in metres from `p` to the segment `a..b`, computed
/// on the local plane around the three points.
pub fn point_to_segment_m(p: Location, a: Location, b: Location) -> f64 {
    let (px, py) = to_local_xy(p);
    let (ax, ay) = to_local_xy(a);
    let (bx, by) = to_local_xy(b);

    let (abx, aby) = (bx - ax, by - ay);
    let (apx, apy) = (px - ax, py - ay);

    let ab2 = abx * abx + aby * aby;
    if ab2 == 0.0 {
        // degenerate segment
        return (apx * apx + apy * apy).sqrt();
    }

    let t = ((apx * abx + apy * aby) / ab2).clamp(0.0, 1.0);
    let (cx, cy) = (ax + t * abx, ay + t * aby);
    let (dx, dy) = (px - cx, py - cy);
    (dx * dx + dy * dy).sqrt()
}

/// Compass octant used to narrow a nearest-edge update to edges heading a
/// particular way. `Both` and `None` accept every edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compass {
    N,
    S,
    E,
    W,
    Ne,
    Nw,
    Se,
    Sw,
    Both,
    None,
}

fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

impl Compass {
    /// Case-insensitive parse; unrecognized input falls back to `Both`.
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_uppercase().as_str() {
            "N" => Self::N,
            "S" => Self::S,
            "E" => Self::E,
            "W" => Self::W,
            "NE" => Self::Ne,
            "NW" => Self::Nw,
            "SE" => Self::Se,
            "SW" => Self::Sw,
            "NONE" => Self::None,
            _ => Self::Both,
        }
    }

    /// Whether an edge whose `(to - from)` displacement is `(dlat, dlon)`
    /// heads in this direction. Matching is on the sign pattern of the
    /// displacement; cardinal directions require the cross axis to be flat.
    pub fn matches_displacement(&self, dlat: f64, dlon: f64) -> bool {
        let ns = sign(dlat);
        let ew = sign(dlon);
        match self {
            Self::N => ns > 0 && ew == 0,
            Self::S => ns < 0 && ew == 0,
            Self::E => ew > 0 && ns == 0,
            Self::W => ew < 0 && ns == 0,
            Self::Ne => ns > 0 && ew > 0,
            Self::Nw => ns > 0 && ew < 0,
            Self::Se => ns < 0 && ew > 0,
            Self::Sw => ns < 0 && ew < 0,
            Self::Both | Self::None => true,
        }
    }
}
