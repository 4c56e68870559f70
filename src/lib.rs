//! streetplan - street coverage route planner client
//!
//! Re-exports all modules for use by the binary target.

// Core engine (events, playback, job status, progress channel)
pub mod core;

// Map geometry
pub mod geo;

// Planning service client
pub mod client;

// Drawing/planning/playback session
pub mod session;

// App modules
pub mod cli;
pub mod config;
pub mod status_bar;

// Re-export commonly used types
pub use client::{HttpPlanningClient, PlanningService, RouteResult};
pub use core::event_bus::{BoxedEvent, EventBus, EventEmitter, downcast_event};
pub use core::playback::PlaybackController;
pub use geo::{DrawingMode, FinalizedShape, LatLon, SelectionRegion, ShapeCapture};
pub use session::Session;
