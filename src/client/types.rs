//! Wire types of the planning service.
//!
//! Field names follow the service's JSON exactly. Unknown fields are ignored
//! so newer servers stay compatible.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::geo::LatLon;

/// Street network the planner should cover.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    #[default]
    Drive,
    Walk,
    Bike,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Drive => "drive",
            NetworkType::Walk => "walk",
            NetworkType::Bike => "bike",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drive" => Ok(NetworkType::Drive),
            "walk" => Ok(NetworkType::Walk),
            "bike" => Ok(NetworkType::Bike),
            other => Err(format!("unknown network type '{}' (expected drive, walk or bike)", other)),
        }
    }
}

/// Export file format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Gpx,
    Kml,
    Geojson,
    Csv,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Gpx,
        ExportFormat::Kml,
        ExportFormat::Geojson,
        ExportFormat::Csv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Gpx => "gpx",
            ExportFormat::Kml => "kml",
            ExportFormat::Geojson => "geojson",
            ExportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExportFormat::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown export format '{}' (expected gpx, kml, geojson or csv)", s))
    }
}

// === Requests ===

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BBoxRequest {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub network_type: NetworkType,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PointRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    pub network_type: NetworkType,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlaceRequest {
    pub place_name: String,
    pub network_type: NetworkType,
}

/// FastAPI error body.
#[derive(Clone, Debug, Deserialize)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}

// === Responses ===

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AreaStats {
    #[serde(default)]
    pub n_nodes: u64,
    #[serde(default)]
    pub n_edges: u64,
    #[serde(default)]
    pub total_edge_length: f64,
    #[serde(default)]
    pub is_eulerian: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_strongly_connected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_odd_degree_nodes: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteStats {
    pub total_distance: f64,
    pub total_edges: u64,
    pub unique_edges: u64,
    pub repeated_edges: u64,
    /// Percentage of the area's edges the route covers.
    pub edge_coverage: f64,
}

/// `LineString` geometry; coordinates are `[lon, lat]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineString {
    #[serde(rename = "type", default = "LineString::kind")]
    pub kind: String,
    #[serde(default)]
    pub coordinates: Vec<[f64; 2]>,
}

impl LineString {
    fn kind() -> String {
        "LineString".to_string()
    }

    pub fn points(&self) -> Vec<LatLon> {
        self.coordinates.iter().map(|[lon, lat]| LatLon::new(*lat, *lon)).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentProperties {
    #[serde(default)]
    pub segment_index: usize,
    /// 1-based pass number of the street this segment runs along.
    #[serde(default = "SegmentProperties::first_pass")]
    pub traversal: u32,
    #[serde(default)]
    pub length: f64,
}

impl SegmentProperties {
    fn first_pass() -> u32 {
        1
    }
}

impl Default for SegmentProperties {
    fn default() -> Self {
        Self {
            segment_index: 0,
            traversal: 1,
            length: 0.0,
        }
    }
}

/// One playback step of the route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathFeature {
    #[serde(default)]
    pub properties: SegmentProperties,
    pub geometry: LineString,
}

/// Route split into ordered playback segments.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentedRoute {
    #[serde(default)]
    pub features: Vec<PathFeature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_traversal: Option<u32>,
}

impl SegmentedRoute {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Highest pass count on any street; falls back to scanning the features.
    pub fn max_traversal(&self) -> u32 {
        self.max_traversal.unwrap_or_else(|| {
            self.features
                .iter()
                .map(|f| f.properties.traversal)
                .max()
                .unwrap_or(1)
        })
    }
}

/// Result of a successful plan (also returned by `GET /route/{id}`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub route_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: NaiveDateTime,
    pub area_stats: AreaStats,
    #[serde(default)]
    pub route_stats: Option<RouteStats>,
    #[serde(default = "default_formats")]
    pub available_formats: Vec<ExportFormat>,
    /// Full route as GeoJSON, for display without segmentation.
    #[serde(default)]
    pub geojson: Option<serde_json::Value>,
    #[serde(default)]
    pub segments: Option<SegmentedRoute>,
}

impl RouteResult {
    pub fn max_traversal(&self) -> u32 {
        self.segments.as_ref().map_or(1, |s| s.max_traversal())
    }

    pub fn segment_count(&self) -> usize {
        self.segments.as_ref().map_or(0, |s| s.len())
    }
}

fn default_formats() -> Vec<ExportFormat> {
    ExportFormat::ALL.to_vec()
}

/// Accept both naive ISO timestamps (`2024-05-01T12:00:00.123456`) and RFC 3339.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.naive_utc());
    }
    NaiveDateTime::from_str(&raw).map_err(serde::de::Error::custom)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryStats {
    pub nodes: u64,
    pub edges: u64,
    pub total_distance: f64,
}

/// Entry of `GET /routes`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub route_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub network_type: NetworkType,
    #[serde(default)]
    pub region: serde_json::Value,
    #[serde(default)]
    pub stats: SummaryStats,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RouteList {
    #[serde(default)]
    pub routes: Vec<RouteSummary>,
}

/// Downloaded export payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_route() -> serde_json::Value {
        json!({
            "route_id": "abc",
            "status": "completed",
            "created_at": "2024-05-01T12:30:45.123456",
            "area_stats": {
                "n_nodes": 120,
                "n_edges": 260,
                "total_edge_length": 15342.5,
                "is_strongly_connected": true,
                "is_eulerian": false,
                "n_odd_degree_nodes": 14,
                "odd_degree_nodes": [1, 2, 3]
            },
            "route_stats": {
                "total_edges": 300,
                "total_distance": 18200.0,
                "unique_edges": 260,
                "repeated_edges": 40,
                "edge_coverage": 100.0
            },
            "available_formats": ["gpx", "kml", "geojson", "csv"],
            "geojson": {"type": "FeatureCollection", "features": []}
        })
    }

    #[test]
    fn test_route_result_decodes_service_payload() {
        let route: RouteResult = serde_json::from_value(sample_route()).unwrap();
        assert_eq!(route.route_id, "abc");
        assert_eq!(route.area_stats.n_nodes, 120);
        assert_eq!(route.area_stats.n_odd_degree_nodes, Some(14));
        assert_eq!(route.route_stats.as_ref().unwrap().repeated_edges, 40);
        assert_eq!(route.available_formats.len(), 4);
        assert!(route.segments.is_none());
        assert_eq!(route.max_traversal(), 1);
    }

    #[test]
    fn test_timestamp_rfc3339() {
        let mut v = sample_route();
        v["created_at"] = json!("2024-05-01T12:30:45Z");
        let route: RouteResult = serde_json::from_value(v).unwrap();
        assert_eq!(route.created_at.to_string(), "2024-05-01 12:30:45");
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        let mut v = sample_route();
        v["created_at"] = json!("yesterday");
        assert!(serde_json::from_value::<RouteResult>(v).is_err());
    }

    #[test]
    fn test_segments_max_traversal() {
        let segs: SegmentedRoute = serde_json::from_value(json!({
            "features": [
                {"properties": {"segment_index": 0, "traversal": 1}, "geometry": {"type": "LineString", "coordinates": [[-71.21, 42.33], [-71.20, 42.34]]}},
                {"properties": {"segment_index": 1, "traversal": 3}, "geometry": {"type": "LineString", "coordinates": [[-71.20, 42.34], [-71.21, 42.33]]}},
                {"geometry": {"coordinates": []}}
            ]
        }))
        .unwrap();
        assert_eq!(segs.len(), 3);
        assert_eq!(segs.max_traversal(), 3);
        assert_eq!(segs.features[2].properties.traversal, 1);
        assert_eq!(segs.features[0].geometry.points()[0], LatLon::new(42.33, -71.21));

        let explicit = SegmentedRoute {
            max_traversal: Some(2),
            ..segs
        };
        assert_eq!(explicit.max_traversal(), 2);
    }

    #[test]
    fn test_requests_serialize_service_shape() {
        let req = PointRequest {
            latitude: 37.87,
            longitude: -122.27,
            radius_meters: 800.0,
            network_type: NetworkType::Walk,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"latitude": 37.87, "longitude": -122.27, "radius_meters": 800.0, "network_type": "walk"})
        );
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("BIKE".parse::<NetworkType>(), Ok(NetworkType::Bike));
        assert!("boat".parse::<NetworkType>().is_err());
        assert_eq!("geojson".parse::<ExportFormat>(), Ok(ExportFormat::Geojson));
        assert!("shp".parse::<ExportFormat>().is_err());
    }
}
