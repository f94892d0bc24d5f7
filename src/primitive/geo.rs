//! Coordinate and bounding-box value types. No geometry beyond storage.

use std::fmt::{Display, Formatter};

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const fn new(lat: f64, lon: f64) -> LatLon {
        LatLon { lat, lon }
    }

    /// Whether the coordinate lies within the world.
    pub fn is_valid(&self) -> bool {
        self.lat.abs() <= 90.0 && self.lon.abs() <= 180.0
    }
}

impl Display for LatLon {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// An axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: LatLon,
    pub max: LatLon,
}

impl Bounds {
    pub const fn new(min: LatLon, max: LatLon) -> Bounds {
        Bounds { min, max }
    }
}

impl Display for Bounds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} .. {}]", self.min, self.max)
    }
}

/// The advertised extent of one downloaded payload, with the label of
/// whatever produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub bounds: Bounds,
    pub origin: Option<String>,
}

impl DataSource {
    pub fn new(bounds: Bounds, origin: Option<String>) -> DataSource {
        DataSource { bounds, origin }
    }
}
