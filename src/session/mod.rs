//! Drawing/planning/playback session - the single owner of mutable state.
//!
//! # Event loop
//!
//! Everything happens inside [`Session::pump`], one turn at a time:
//!
//! 1. finished background requests (plan, segments, export, lookups)
//! 2. progress-channel updates
//! 3. queued command events from the [`EventBus`]
//! 4. timers: playback autoplay, job auto-clear
//!
//! Network calls run on short-lived threads and report back through a
//! crossbeam channel, so no state is shared across threads.
//!
//! # Request slot
//!
//! Only the newest plan request counts. Issuing another one supersedes the
//! previous ticket; a late response for a superseded ticket is logged and
//! dropped. Segment responses are matched against the displayed route id.

mod download;
pub mod events;

pub use download::{DirectoryDownloads, DownloadSink};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::client::{
    ClientError, ClientResult, ExportFile, ExportFormat, NetworkType, PathFeature, PlanningService,
    RouteResult, RouteSummary, SegmentedRoute,
};
use crate::core::event_bus::{BoxedEvent, EventBus, EventEmitter, downcast_event};
use crate::core::job::{JobSlot, JobStatus, JobTicket, JobUpdate, PlanningJob, TicketCounter};
use crate::core::playback::{LegendEntry, PlaybackController, traversal_legend};
use crate::core::playback_events::*;
use crate::core::progress::{ProgressChannel, ProgressError, ReconnectPolicy};
use crate::geo::{
    ClickOutcome, DrawingMode, FinalizedShape, LatLon, RenderHint, SelectionRegion, ShapeCapture,
    resolve,
};
use events::*;

/// Results delivered back into the loop by request threads.
enum Turn {
    Planned {
        ticket: JobTicket,
        result: ClientResult<RouteResult>,
    },
    Opened {
        ticket: JobTicket,
        result: ClientResult<RouteResult>,
    },
    Segments {
        route_id: String,
        result: ClientResult<SegmentedRoute>,
    },
    Exported {
        route_id: String,
        format: ExportFormat,
        result: ClientResult<ExportFile>,
    },
    Listed(ClientResult<Vec<RouteSummary>>),
    /// The request thread could not be started.
    NotStarted {
        name: String,
        ticket: Option<JobTicket>,
        error: String,
    },
}

/// What the map should show for the current route.
#[derive(Debug, Clone, Copy)]
pub enum RouteDisplay<'a> {
    Nothing,
    /// Segment fetch failed or was empty: draw the whole route at once.
    FullRoute(Option<&'a serde_json::Value>),
    /// Draw `features[..visible_end]`, highlighting `current`.
    Segments {
        features: &'a [PathFeature],
        visible_end: usize,
        current: usize,
    },
}

pub struct Session {
    service: Arc<dyn PlanningService>,
    downloads: Box<dyn DownloadSink>,
    bus: EventBus,

    capture: ShapeCapture,
    region: Option<SelectionRegion>,
    network: NetworkType,

    tickets: TicketCounter,
    job: JobSlot,
    route: Option<RouteResult>,
    segments_failed: bool,
    playback: PlaybackController,
    routes: Vec<RouteSummary>,

    turn_tx: Sender<Turn>,
    turn_rx: Receiver<Turn>,
    pending_requests: usize,

    progress_tx: Sender<JobUpdate>,
    progress_rx: Receiver<JobUpdate>,
    progress: Option<ProgressChannel>,
}

impl Session {
    pub fn new(service: Arc<dyn PlanningService>, downloads: Box<dyn DownloadSink>) -> Self {
        let (turn_tx, turn_rx) = unbounded();
        let (progress_tx, progress_rx) = unbounded();
        Self {
            service,
            downloads,
            bus: EventBus::new(),
            capture: ShapeCapture::new(),
            region: None,
            network: NetworkType::default(),
            tickets: TicketCounter::default(),
            job: JobSlot::new(),
            route: None,
            segments_failed: false,
            playback: PlaybackController::new(),
            routes: Vec::new(),
            turn_tx,
            turn_rx,
            pending_requests: 0,
            progress_tx,
            progress_rx,
            progress: None,
        }
    }

    // === Resources ===

    /// Open the progress connection for this session. Replaces any open one.
    pub fn connect_progress(&mut self, url: &str, policy: ReconnectPolicy) -> Result<(), ProgressError> {
        self.disconnect_progress();
        let channel = ProgressChannel::open(url, policy, self.progress_tx.clone())?;
        self.progress = Some(channel);
        Ok(())
    }

    pub fn disconnect_progress(&mut self) {
        if let Some(mut channel) = self.progress.take() {
            channel.close();
        }
    }

    pub fn progress_connected(&self) -> bool {
        self.progress.as_ref().is_some_and(|c| c.is_alive())
    }

    /// Feed updates as if they came from the progress channel.
    pub fn progress_sender(&self) -> Sender<JobUpdate> {
        self.progress_tx.clone()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn emitter(&self) -> EventEmitter {
        self.bus.emitter()
    }

    // === Read access ===

    pub fn drawing_mode(&self) -> DrawingMode {
        self.capture.mode()
    }

    pub fn render_hint(&self) -> &RenderHint {
        self.capture.hint()
    }

    pub fn shape(&self) -> Option<&FinalizedShape> {
        self.capture.finalized()
    }

    pub fn region(&self) -> Option<&SelectionRegion> {
        self.region.as_ref()
    }

    pub fn network_type(&self) -> NetworkType {
        self.network
    }

    pub fn job(&self) -> Option<&PlanningJob> {
        self.job.current()
    }

    pub fn route(&self) -> Option<&RouteResult> {
        self.route.as_ref()
    }

    pub fn routes(&self) -> &[RouteSummary] {
        &self.routes
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn is_planning(&self) -> bool {
        self.tickets.is_in_flight()
    }

    /// Background requests not yet delivered back into the loop.
    pub fn has_pending_requests(&self) -> bool {
        self.pending_requests > 0
    }

    /// True once the segment fetch for the current route failed or came back empty.
    pub fn segments_unavailable(&self) -> bool {
        self.segments_failed
    }

    pub fn display(&self) -> RouteDisplay<'_> {
        let Some(route) = &self.route else {
            return RouteDisplay::Nothing;
        };
        match &route.segments {
            Some(segments) if !segments.is_empty() => RouteDisplay::Segments {
                features: &segments.features,
                visible_end: self.playback.visible_range().end,
                current: self.playback.current(),
            },
            // Fallback, or segments still loading
            _ => RouteDisplay::FullRoute(route.geojson.as_ref()),
        }
    }

    /// Legend rows for multi-pass routes; empty when no street is revisited.
    pub fn legend(&self) -> Vec<LegendEntry> {
        match &self.route {
            Some(route) if route.segment_count() > 0 => traversal_legend(route.max_traversal()),
            _ => Vec::new(),
        }
    }

    // === Drawing ===

    pub fn set_mode(&mut self, mode: DrawingMode) {
        self.capture.set_mode(mode);
    }

    pub fn clear_drawing(&mut self) {
        self.capture.clear();
    }

    pub fn on_map_click(&mut self, point: LatLon) -> Option<SelectionRegion> {
        let shape = self.capture.on_map_click(point)?;
        Some(self.shape_completed(shape))
    }

    pub fn on_map_double_click(&mut self, point: LatLon) -> ClickOutcome {
        let outcome = self.capture.on_map_double_click(point);
        if let Some(shape) = &outcome.completed {
            self.shape_completed(shape.clone());
        }
        outcome
    }

    fn shape_completed(&mut self, shape: FinalizedShape) -> SelectionRegion {
        let region = resolve(&shape);
        info!("Selected {} -> {:?}", shape.name(), region);
        self.region = Some(region);
        self.bus.emit(ShapeCompletedEvent { shape, region });
        region
    }

    pub fn set_network_type(&mut self, network: NetworkType) {
        self.network = network;
    }

    // === Planning ===

    /// Plan over the last drawn region. Returns None if nothing is drawn.
    pub fn plan_selection(&mut self) -> Option<JobTicket> {
        let Some(region) = self.region else {
            self.alert("Draw a region on the map first");
            return None;
        };
        let network = self.network;
        let ticket = self.begin_job("Submitting region to planner...");
        let service = Arc::clone(&self.service);
        self.spawn_request("plan", Some(ticket), move || Turn::Planned {
            ticket,
            result: service.plan_region(&region, network),
        });
        Some(ticket)
    }

    pub fn plan_place(&mut self, name: &str) -> JobTicket {
        let network = self.network;
        let ticket = self.begin_job(format!("Submitting '{}' to planner...", name));
        let service = Arc::clone(&self.service);
        let name = name.to_string();
        self.spawn_request("plan", Some(ticket), move || Turn::Planned {
            ticket,
            result: service.plan_by_place(&name, network),
        });
        ticket
    }

    /// Load a previously planned route by id and display it.
    pub fn open_route(&mut self, route_id: &str) -> JobTicket {
        let ticket = self.begin_job(format!("Loading route {}...", route_id));
        let service = Arc::clone(&self.service);
        let route_id = route_id.to_string();
        self.spawn_request("route", Some(ticket), move || Turn::Opened {
            ticket,
            result: service.get_route(&route_id),
        });
        ticket
    }

    pub fn refresh_routes(&mut self) {
        let service = Arc::clone(&self.service);
        self.spawn_request("routes", None, move || Turn::Listed(service.list_routes()));
    }

    /// Download the displayed route. Returns false if there is no route.
    pub fn export(&mut self, format: ExportFormat) -> bool {
        let Some(route_id) = self.route.as_ref().map(|r| r.route_id.clone()) else {
            self.alert("No route to export");
            return false;
        };
        self.export_route(&route_id, format);
        true
    }

    /// Download any stored route by id. Displayed state is left alone.
    pub fn export_route(&mut self, route_id: &str, format: ExportFormat) {
        let route_id = route_id.to_string();
        let service = Arc::clone(&self.service);
        self.spawn_request("export", None, move || Turn::Exported {
            result: service.export_route(&route_id, format),
            route_id,
            format,
        });
    }

    fn begin_job(&mut self, message: impl Into<String>) -> JobTicket {
        let ticket = self.tickets.issue();
        self.job.begin(ticket.job_id, message);
        self.bus.emit(JobChangedEvent(self.job.current().cloned()));
        ticket
    }

    fn spawn_request<F>(&mut self, name: &str, ticket: Option<JobTicket>, request: F)
    where
        F: FnOnce() -> Turn + Send + 'static,
    {
        let tx = self.turn_tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("streetplan-{}", name))
            .spawn(move || {
                // Receiver gone means the session is shutting down
                let _ = tx.send(request());
            });
        if let Err(e) = spawned {
            // Reported from the next pump so the failure is stamped with loop time
            let _ = self.turn_tx.send(Turn::NotStarted {
                name: name.to_string(),
                ticket,
                error: e.to_string(),
            });
        }
        self.pending_requests += 1;
    }

    // === Event loop ===

    /// Run one loop turn at `now`.
    pub fn pump(&mut self, now: Instant) {
        while let Ok(turn) = self.turn_rx.try_recv() {
            self.pending_requests = self.pending_requests.saturating_sub(1);
            self.handle_turn(turn, now);
        }

        while let Ok(update) = self.progress_rx.try_recv() {
            if self.job.apply(update, now) {
                self.bus.emit(JobChangedEvent(self.job.current().cloned()));
            }
        }

        for event in self.bus.poll() {
            self.handle_event(&event);
        }

        if let Some(index) = self.playback.tick(now) {
            debug!("Autoplay -> segment {}", index);
            self.bus.emit(PlaybackChangedEvent(self.playback.state()));
        }

        if self.job.tick(now) {
            debug!("Job status cleared");
            self.bus.emit(JobChangedEvent(None));
        }
    }

    fn handle_turn(&mut self, turn: Turn, now: Instant) {
        match turn {
            Turn::Planned { ticket, result } | Turn::Opened { ticket, result } => {
                if !self.tickets.settle(ticket) {
                    info!("Ignoring response for superseded request #{}", ticket.serial);
                    return;
                }
                match result {
                    Ok(route) => {
                        let update = JobUpdate::new(JobStatus::Completed, "Route ready").with_progress(100);
                        self.job.apply(update, now);
                        self.bus.emit(JobChangedEvent(self.job.current().cloned()));
                        self.install_route(route);
                    }
                    Err(e) => {
                        error!("Plan request failed: {}", e);
                        self.fail_job(e.user_message(), now);
                    }
                }
            }
            Turn::Segments { route_id, result } => self.segments_arrived(route_id, result),
            Turn::Exported { route_id, format, result } => self.export_finished(route_id, format, result),
            Turn::Listed(result) => match result {
                Ok(routes) => {
                    info!("{} routes available", routes.len());
                    self.routes = routes.clone();
                    self.bus.emit(RoutesListedEvent(routes));
                }
                Err(e) => {
                    warn!("Listing routes failed: {}", e);
                    self.alert(e.user_message());
                }
            },
            Turn::NotStarted { name, ticket, error } => {
                error!("Failed to start {} request: {}", name, error);
                match ticket {
                    Some(ticket) if self.tickets.settle(ticket) => {
                        self.fail_job(format!("Error: {}", error), now);
                    }
                    Some(_) => {}
                    None => self.alert(format!("Failed to start {} request", name)),
                }
            }
        }
    }

    fn fail_job(&mut self, message: String, now: Instant) {
        self.job.apply(JobUpdate::new(JobStatus::Error, message), now);
        self.bus.emit(JobChangedEvent(self.job.current().cloned()));
    }

    /// Replace the displayed route wholesale and restart playback.
    fn install_route(&mut self, route: RouteResult) {
        info!(
            "Route {} loaded: {} nodes, {} edges",
            route.route_id, route.area_stats.n_nodes, route.area_stats.n_edges
        );
        let route_id = route.route_id.clone();
        let has_segments = route.segments.as_ref().is_some_and(|s| !s.is_empty());
        self.segments_failed = false;
        self.route = Some(route);
        self.bus.emit(RouteLoadedEvent { route_id: route_id.clone() });

        if has_segments {
            self.reset_playback_for_route();
        } else {
            self.playback.set_total(0);
            self.playback.reset();
            let service = Arc::clone(&self.service);
            self.spawn_request("segments", None, move || Turn::Segments {
                result: service.fetch_segments(&route_id),
                route_id,
            });
        }
    }

    fn segments_arrived(&mut self, route_id: String, result: ClientResult<SegmentedRoute>) {
        let Some(route) = self.route.as_mut().filter(|r| r.route_id == route_id) else {
            debug!("Dropping segments for route {} (no longer displayed)", route_id);
            return;
        };
        match result {
            Ok(segments) => {
                info!("Route {}: {} segments", route_id, segments.len());
                if segments.is_empty() {
                    self.segments_failed = true;
                }
                route.segments = Some(segments);
            }
            Err(e) => {
                // Non-fatal: the full route stays on screen
                warn!("Segments unavailable for {}, showing full route: {}", route_id, e);
                self.segments_failed = true;
                route.segments = None;
            }
        }
        self.reset_playback_for_route();
    }

    fn reset_playback_for_route(&mut self) {
        let Some(route) = &self.route else {
            return;
        };
        let total = route.segment_count();
        let event = RouteDisplayChangedEvent {
            route_id: route.route_id.clone(),
            segmented: total > 0,
            total_segments: total,
            max_traversal: route.max_traversal(),
        };
        self.playback.set_total(total);
        self.playback.reset();
        self.bus.emit(event);
        self.bus.emit(PlaybackChangedEvent(self.playback.state()));
    }

    fn export_finished(&mut self, route_id: String, format: ExportFormat, result: ClientResult<ExportFile>) {
        let saved = result.and_then(|file| self.downloads.save(&file).map_err(ClientError::from));
        match saved {
            Ok(path) => self.bus.emit(DownloadSavedEvent { route_id, format, path }),
            Err(e) => {
                error!("Export of {} as {} failed: {}", route_id, format, e);
                self.alert(format!("Export failed: {}", e.user_message()));
            }
        }
    }

    fn alert(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.bus.emit(AlertEvent(message));
    }

    // === Commands ===

    fn handle_event(&mut self, event: &BoxedEvent) {
        let before = self.playback.state();

        if downcast_event::<TogglePlayPauseEvent>(event).is_some() {
            self.playback.toggle_play();
        } else if downcast_event::<PlayEvent>(event).is_some() {
            self.playback.play();
        } else if downcast_event::<PauseEvent>(event).is_some() {
            self.playback.pause();
        } else if downcast_event::<ResetPlaybackEvent>(event).is_some() {
            self.playback.reset();
        } else if let Some(e) = downcast_event::<StepEvent>(event) {
            self.playback.step(e.0);
        } else if let Some(e) = downcast_event::<JumpEvent>(event) {
            self.playback.jump(e.0);
        } else if let Some(e) = downcast_event::<SeekEvent>(event) {
            self.playback.seek(e.0);
        } else if let Some(e) = downcast_event::<SetSpeedEvent>(event) {
            if !self.playback.set_speed(e.0) {
                self.alert(format!("Unsupported speed {}x", e.0));
            }
        } else if downcast_event::<FasterEvent>(event).is_some() {
            self.playback.faster();
        } else if downcast_event::<SlowerEvent>(event).is_some() {
            self.playback.slower();
        } else if let Some(e) = downcast_event::<SetDrawingModeEvent>(event) {
            self.set_mode(e.0);
        } else if let Some(e) = downcast_event::<MapClickEvent>(event) {
            self.on_map_click(e.0);
        } else if let Some(e) = downcast_event::<MapDoubleClickEvent>(event) {
            self.on_map_double_click(e.0);
        } else if downcast_event::<ClearDrawingEvent>(event).is_some() {
            self.clear_drawing();
        } else if let Some(e) = downcast_event::<SetNetworkTypeEvent>(event) {
            self.set_network_type(e.0);
        } else if downcast_event::<PlanSelectionEvent>(event).is_some() {
            self.plan_selection();
        } else if let Some(e) = downcast_event::<PlanPlaceEvent>(event) {
            self.plan_place(&e.0);
        } else if let Some(e) = downcast_event::<OpenRouteEvent>(event) {
            self.open_route(&e.0);
        } else if downcast_event::<ListRoutesEvent>(event).is_some() {
            self.refresh_routes();
        } else if let Some(e) = downcast_event::<ExportRouteEvent>(event) {
            self.export(e.0);
        }

        let after = self.playback.state();
        if after != before {
            self.bus.emit(PlaybackChangedEvent(after));
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect_progress();
    }
}
