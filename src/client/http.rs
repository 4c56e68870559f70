//! Blocking HTTP client for the planning service (reqwest).
//!
//! # Endpoints
//!
//! | Method | Path                        | Operation                 |
//! |--------|-----------------------------|---------------------------|
//! | POST   | `/plan-route/bbox`          | [`PlanningService::plan_by_bbox`]  |
//! | POST   | `/plan-route/point`         | [`PlanningService::plan_by_point`] |
//! | POST   | `/plan-route/place`         | [`PlanningService::plan_by_place`] |
//! | GET    | `/route/{id}`               | [`PlanningService::get_route`]     |
//! | GET    | `/route/{id}/segments`      | [`PlanningService::fetch_segments`]|
//! | GET    | `/routes`                   | [`PlanningService::list_routes`]   |
//! | GET    | `/export/{id}/{format}`     | [`PlanningService::export_route`]  |
//!
//! Calls block; the session runs them on background threads.

use log::{debug, info, warn};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

use super::types::{
    BBoxRequest, ErrorBody, ExportFile, ExportFormat, NetworkType, PlaceRequest, PointRequest,
    RouteList, RouteResult, RouteSummary, SegmentedRoute,
};
use crate::geo::SelectionRegion;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {code}: {detail}")]
    Status { code: u16, detail: String },
    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("failed to save download: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Status { code: 404, .. })
    }

    /// Message suitable for the status line.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Http(e) if e.is_connect() => "Cannot reach the planning service".to_string(),
            ClientError::Http(e) if e.is_timeout() => "The planning service timed out".to_string(),
            ClientError::Status { detail, .. } => format!("Error: {}", detail),
            other => format!("Error: {}", other),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Operations of the external planning service.
pub trait PlanningService: Send + Sync {
    fn plan_by_bbox(&self, region: &SelectionRegion, network: NetworkType) -> ClientResult<RouteResult>;
    fn plan_by_point(&self, region: &SelectionRegion, network: NetworkType) -> ClientResult<RouteResult>;
    fn plan_by_place(&self, name: &str, network: NetworkType) -> ClientResult<RouteResult>;
    fn fetch_segments(&self, route_id: &str) -> ClientResult<SegmentedRoute>;
    fn export_route(&self, route_id: &str, format: ExportFormat) -> ClientResult<ExportFile>;
    fn list_routes(&self) -> ClientResult<Vec<RouteSummary>>;
    fn get_route(&self, route_id: &str) -> ClientResult<RouteResult>;

    /// Plan for whichever region kind was drawn.
    fn plan_region(&self, region: &SelectionRegion, network: NetworkType) -> ClientResult<RouteResult> {
        match region {
            SelectionRegion::BBox { .. } => self.plan_by_bbox(region, network),
            SelectionRegion::PointRadius { .. } => self.plan_by_point(region, network),
        }
    }
}

/// reqwest-backed [`PlanningService`].
#[derive(Clone, Debug)]
pub struct HttpPlanningClient {
    base_url: String,
    http: Client,
}

impl HttpPlanningClient {
    /// `base_url` includes the API prefix, e.g. `http://localhost:8000/api`.
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ClientResult<T> {
        let url = self.url(path);
        debug!("POST {}", url);
        let response = self.http.post(&url).json(body).send()?;
        decode(check(response)?)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self.http.get(&url).send()?;
        decode(check(response)?)
    }
}

/// Map HTTP error statuses to [`ClientError::Status`], using FastAPI's `detail`.
fn check(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| match b.detail {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .unwrap_or_else(|_| {
            if body.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body
            }
        });
    if status == StatusCode::NOT_FOUND {
        debug!("Not found: {}", detail);
    } else {
        warn!("Planning service error {}: {}", status.as_u16(), detail);
    }
    Err(ClientError::Status {
        code: status.as_u16(),
        detail,
    })
}

fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let bytes = response.bytes()?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl PlanningService for HttpPlanningClient {
    fn plan_by_bbox(&self, region: &SelectionRegion, network: NetworkType) -> ClientResult<RouteResult> {
        let SelectionRegion::BBox { north, south, east, west } = *region else {
            return Err(ClientError::InvalidRequest("bbox plan needs a bounding box region".into()));
        };
        info!("Planning bbox N={:.6} S={:.6} E={:.6} W={:.6} ({})", north, south, east, west, network);
        self.post_json(
            "/plan-route/bbox",
            &BBoxRequest { north, south, east, west, network_type: network },
        )
    }

    fn plan_by_point(&self, region: &SelectionRegion, network: NetworkType) -> ClientResult<RouteResult> {
        let SelectionRegion::PointRadius { lat, lon, radius_meters } = *region else {
            return Err(ClientError::InvalidRequest("point plan needs a point+radius region".into()));
        };
        info!("Planning {:.0}m around ({:.6}, {:.6}) ({})", radius_meters, lat, lon, network);
        self.post_json(
            "/plan-route/point",
            &PointRequest {
                latitude: lat,
                longitude: lon,
                radius_meters,
                network_type: network,
            },
        )
    }

    fn plan_by_place(&self, name: &str, network: NetworkType) -> ClientResult<RouteResult> {
        if name.trim().is_empty() {
            return Err(ClientError::InvalidRequest("place name is empty".into()));
        }
        info!("Planning place '{}' ({})", name, network);
        self.post_json(
            "/plan-route/place",
            &PlaceRequest {
                place_name: name.to_string(),
                network_type: network,
            },
        )
    }

    fn fetch_segments(&self, route_id: &str) -> ClientResult<SegmentedRoute> {
        self.get_json(&format!("/route/{}/segments", route_id))
    }

    fn export_route(&self, route_id: &str, format: ExportFormat) -> ClientResult<ExportFile> {
        let url = self.url(&format!("/export/{}/{}", route_id, format));
        debug!("GET {}", url);
        let response = check(self.http.get(&url).send()?)?;
        let bytes = response.bytes()?.to_vec();
        info!("Exported route {} as {} ({} bytes)", route_id, format, bytes.len());
        Ok(ExportFile {
            filename: format!("route_{}.{}", route_id, format),
            bytes,
        })
    }

    fn list_routes(&self) -> ClientResult<Vec<RouteSummary>> {
        let list: RouteList = self.get_json("/routes")?;
        Ok(list.routes)
    }

    fn get_route(&self, route_id: &str) -> ClientResult<RouteResult> {
        self.get_json(&format!("/route/{}", route_id))
    }
}
