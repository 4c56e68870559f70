//! Geographic primitives and finalized drawn shapes.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Minimum number of vertices required for a finished polygon.
pub const MIN_POLYGON_VERTICES: usize = 3;

/// A point on the map in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_to(&self, other: &LatLon) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let d_phi = (other.lat - self.lat).to_radians();
        let d_lambda = (other.lon - self.lon).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }
}

/// Axis-aligned lat/lon rectangle. `south <= north` and `west <= east` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    /// Normalized bounds spanning two arbitrary corners.
    pub fn from_corners(a: LatLon, b: LatLon) -> Self {
        Self {
            south: a.lat.min(b.lat),
            west: a.lon.min(b.lon),
            north: a.lat.max(b.lat),
            east: a.lon.max(b.lon),
        }
    }

    /// Envelope of a point set. Returns None for an empty set.
    pub fn enclosing<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a LatLon>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let init = Self {
            south: first.lat,
            west: first.lon,
            north: first.lat,
            east: first.lon,
        };
        Some(iter.fold(init, |b, p| Self {
            south: b.south.min(p.lat),
            west: b.west.min(p.lon),
            north: b.north.max(p.lat),
            east: b.east.max(p.lon),
        }))
    }

    pub fn contains(&self, p: &LatLon) -> bool {
        p.lat >= self.south && p.lat <= self.north && p.lon >= self.west && p.lon <= self.east
    }

    pub fn south_west(&self) -> LatLon {
        LatLon::new(self.south, self.west)
    }

    pub fn north_east(&self) -> LatLon {
        LatLon::new(self.north, self.east)
    }
}

/// A shape the user finished drawing on the map.
///
/// Only [`ShapeCapture`](super::capture::ShapeCapture) constructs these, so a
/// polygon always carries at least [`MIN_POLYGON_VERTICES`] vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FinalizedShape {
    Rectangle { bounds: Bounds },
    Circle { center: LatLon, radius_meters: f64 },
    Polygon { vertices: Vec<LatLon> },
}

impl FinalizedShape {
    pub fn name(&self) -> &'static str {
        match self {
            FinalizedShape::Rectangle { .. } => "rectangle",
            FinalizedShape::Circle { .. } => "circle",
            FinalizedShape::Polygon { .. } => "polygon",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_zero() {
        let p = LatLon::new(42.33, -71.21);
        assert_eq!(p.distance_to(&p), 0.0);
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        let a = LatLon::new(0.0, 0.0);
        let b = LatLon::new(1.0, 0.0);
        // One degree of arc on the mean sphere
        let expected = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        assert!((a.distance_to(&b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = LatLon::new(37.8716, -122.2727);
        let b = LatLon::new(37.8600, -122.2500);
        assert!((a.distance_to(&b) - b.distance_to(&a)).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_from_corners_any_order() {
        let a = LatLon::new(42.34, -71.20);
        let b = LatLon::new(42.33, -71.22);
        let ab = Bounds::from_corners(a, b);
        let ba = Bounds::from_corners(b, a);
        assert_eq!(ab, ba);
        assert_eq!(ab.north, 42.34);
        assert_eq!(ab.south, 42.33);
        assert_eq!(ab.east, -71.20);
        assert_eq!(ab.west, -71.22);
    }

    #[test]
    fn test_enclosing_empty() {
        assert!(Bounds::enclosing(&Vec::<LatLon>::new()).is_none());
    }

    #[test]
    fn test_shape_serializes_tagged() {
        let shape = FinalizedShape::Circle {
            center: LatLon::new(1.0, 2.0),
            radius_meters: 10.0,
        };
        let json = serde_json::to_value(&shape).unwrap();
        assert_eq!(json["type"], "circle");
        assert_eq!(json["radius_meters"], 10.0);
    }
}
