//! Core engine modules - events, playback, job status, progress channel
//!
//! These modules form the session engine, independent of any UI.

pub mod event_bus;
pub mod job;
pub mod playback;
pub mod playback_events;
pub mod progress;

// Re-exports for convenience
pub use event_bus::{BoxedEvent, EventBus, EventEmitter, downcast_event};
pub use job::{JobSlot, JobStatus, JobUpdate, PlanningJob};
pub use playback::{PlaybackController, PlaybackState, traversal_legend};
pub use progress::{ProgressChannel, ReconnectPolicy};
