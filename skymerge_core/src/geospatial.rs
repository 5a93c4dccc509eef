//! Great-circle geometry relative to the query point.

use geo::{HaversineBearing, HaversineDistance, Point};
use serde::{Deserialize, Serialize};

/// Earth radius in nautical miles
pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Mean Earth radius the `geo` crate uses for haversine, in metres
const GEO_EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Point of interest for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryPoint {
    pub lat: f64,
    pub lon: f64,
    pub radius_nm: f64,
}

impl QueryPoint {
    pub fn new(lat: f64, lon: f64, radius_nm: f64) -> Self {
        Self { lat, lon, radius_nm }
    }

    fn point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

/// Distance, bearing and radius membership of one aircraft.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Relation {
    /// Rounded to 3 decimals
    pub distance_nm: f64,
    /// Unrounded, for ranking
    pub exact_distance_nm: f64,
    /// Initial bearing, [0, 360), rounded to 1 decimal
    pub bearing_deg: f64,
    /// Decided on the unrounded distance
    pub within_radius: bool,
}

/// Haversine distance in nautical miles between two lat/lon pairs.
pub fn distance_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let meters = Point::new(lon1, lat1).haversine_distance(&Point::new(lon2, lat2));
    meters / GEO_EARTH_RADIUS_M * EARTH_RADIUS_NM
}

/// Initial great-circle bearing from the first point to the second, in [0, 360).
pub fn initial_bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let raw = Point::new(lon1, lat1).haversine_bearing(Point::new(lon2, lat2));
    let b = raw.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if b >= 360.0 {
        0.0
    } else {
        b
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Geospatial calculator for a fixed query point.
#[derive(Debug, Clone, Copy)]
pub struct GeoCalculator {
    point: QueryPoint,
}

impl GeoCalculator {
    pub fn new(point: QueryPoint) -> Self {
        Self { point }
    }

    pub fn point(&self) -> QueryPoint {
        self.point
    }

    /// Relation of an aircraft position to the query point; `None` if either
    /// coordinate is missing.
    pub fn relate(&self, lat: Option<f64>, lon: Option<f64>) -> Option<Relation> {
        let (lat, lon) = (lat?, lon?);
        let p = self.point;
        let d = distance_nm(p.lat, p.lon, lat, lon);
        let bearing = round_to(initial_bearing_deg(p.lat, p.lon, lat, lon), 1);
        Some(Relation {
            distance_nm: round_to(d, 3),
            exact_distance_nm: d,
            bearing_deg: if bearing >= 360.0 { 0.0 } else { bearing },
            within_radius: d <= p.radius_nm,
        })
    }
}
