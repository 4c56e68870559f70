//! Session events.
//!
//! Commands are emitted by a front-end (or the stdin controller) and drained
//! by `Session::pump()`. Notifications are emitted by the session; subscribe
//! to them on the bus.

use std::path::PathBuf;

use crate::client::{ExportFormat, NetworkType, RouteSummary};
use crate::core::PlaybackState;
use crate::core::job::PlanningJob;
use crate::geo::{DrawingMode, FinalizedShape, LatLon, SelectionRegion};

// === Drawing commands ===

#[derive(Clone, Debug)]
pub struct SetDrawingModeEvent(pub DrawingMode);

#[derive(Clone, Debug)]
pub struct MapClickEvent(pub LatLon);

#[derive(Clone, Debug)]
pub struct MapDoubleClickEvent(pub LatLon);

#[derive(Clone, Debug)]
pub struct ClearDrawingEvent;

// === Planning commands ===

#[derive(Clone, Debug)]
pub struct SetNetworkTypeEvent(pub NetworkType);

/// Plan over the last drawn region.
#[derive(Clone, Debug)]
pub struct PlanSelectionEvent;

#[derive(Clone, Debug)]
pub struct PlanPlaceEvent(pub String);

#[derive(Clone, Debug)]
pub struct OpenRouteEvent(pub String);

#[derive(Clone, Debug)]
pub struct ListRoutesEvent;

#[derive(Clone, Debug)]
pub struct ExportRouteEvent(pub ExportFormat);

// === Notifications ===

#[derive(Clone, Debug)]
pub struct ShapeCompletedEvent {
    pub shape: FinalizedShape,
    pub region: SelectionRegion,
}

/// Visible job changed (None = cleared).
#[derive(Clone, Debug)]
pub struct JobChangedEvent(pub Option<PlanningJob>);

#[derive(Clone, Debug)]
pub struct RouteLoadedEvent {
    pub route_id: String,
}

/// Segments arrived (`segmented = true`) or the full route is shown instead.
#[derive(Clone, Debug)]
pub struct RouteDisplayChangedEvent {
    pub route_id: String,
    pub segmented: bool,
    pub total_segments: usize,
    pub max_traversal: u32,
}

#[derive(Clone, Debug)]
pub struct PlaybackChangedEvent(pub PlaybackState);

#[derive(Clone, Debug)]
pub struct RoutesListedEvent(pub Vec<RouteSummary>);

#[derive(Clone, Debug)]
pub struct DownloadSavedEvent {
    pub route_id: String,
    pub format: ExportFormat,
    pub path: PathBuf,
}

/// User-facing alert (export failures, bad commands).
#[derive(Clone, Debug)]
pub struct AlertEvent(pub String);
