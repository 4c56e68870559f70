//! Finalized shape -> selection region sent to the planner.

use serde::{Deserialize, Serialize};

use super::shape::{Bounds, FinalizedShape, LatLon};

/// Region representation understood by the planning service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionRegion {
    BBox {
        north: f64,
        south: f64,
        east: f64,
        west: f64,
    },
    PointRadius {
        lat: f64,
        lon: f64,
        radius_meters: f64,
    },
}

impl SelectionRegion {
    pub fn from_bounds(b: &Bounds) -> Self {
        SelectionRegion::BBox {
            north: b.north,
            south: b.south,
            east: b.east,
            west: b.west,
        }
    }

    pub fn contains(&self, p: &LatLon) -> bool {
        match *self {
            SelectionRegion::BBox { north, south, east, west } => {
                p.lat >= south && p.lat <= north && p.lon >= west && p.lon <= east
            }
            SelectionRegion::PointRadius { lat, lon, radius_meters } => {
                LatLon::new(lat, lon).distance_to(p) <= radius_meters
            }
        }
    }
}

/// Resolve a drawn shape into the region the planner receives.
///
/// Polygons collapse to their bounding envelope.
pub fn resolve(shape: &FinalizedShape) -> SelectionRegion {
    match shape {
        FinalizedShape::Rectangle { bounds } => SelectionRegion::from_bounds(bounds),
        FinalizedShape::Circle { center, radius_meters } => SelectionRegion::PointRadius {
            lat: center.lat,
            lon: center.lon,
            radius_meters: *radius_meters,
        },
        FinalizedShape::Polygon { vertices } => match Bounds::enclosing(vertices) {
            Some(b) => SelectionRegion::from_bounds(&b),
            // Unreachable through ShapeCapture; degenerate to an empty box at the origin
            None => SelectionRegion::BBox {
                north: 0.0,
                south: 0.0,
                east: 0.0,
                west: 0.0,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_passthrough() {
        let bounds = Bounds {
            south: 42.33,
            west: -71.22,
            north: 42.34,
            east: -71.20,
        };
        let region = resolve(&FinalizedShape::Rectangle { bounds });
        assert_eq!(
            region,
            SelectionRegion::BBox {
                north: 42.34,
                south: 42.33,
                east: -71.20,
                west: -71.22
            }
        );
    }

    #[test]
    fn test_circle_verbatim() {
        let region = resolve(&FinalizedShape::Circle {
            center: LatLon::new(37.87, -122.27),
            radius_meters: 1500.0,
        });
        assert_eq!(
            region,
            SelectionRegion::PointRadius {
                lat: 37.87,
                lon: -122.27,
                radius_meters: 1500.0
            }
        );
    }

    #[test]
    fn test_polygon_envelope_contains_all_vertices() {
        let vertices = vec![
            LatLon::new(42.331, -71.215),
            LatLon::new(42.339, -71.201),
            LatLon::new(42.335, -71.219),
            LatLon::new(42.330, -71.208),
        ];
        let shape = FinalizedShape::Polygon { vertices: vertices.clone() };
        let region = resolve(&shape);
        for v in &vertices {
            assert!(region.contains(v), "{:?} outside {:?}", v, region);
        }
        let SelectionRegion::BBox { north, south, east, west } = region else {
            panic!("polygon must resolve to a bbox");
        };
        assert_eq!((north, south, east, west), (42.339, 42.330, -71.201, -71.219));
    }

    #[test]
    fn test_resolve_idempotent() {
        let shape = FinalizedShape::Polygon {
            vertices: vec![LatLon::new(0.0, 0.0), LatLon::new(1.0, 2.0), LatLon::new(-1.0, 3.0)],
        };
        assert_eq!(resolve(&shape), resolve(&shape));
    }
}
