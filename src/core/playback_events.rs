//! Playback control events (commands into the session).

// === Play state ===

#[derive(Clone, Debug)]
pub struct TogglePlayPauseEvent;

#[derive(Clone, Debug)]
pub struct PlayEvent;

#[derive(Clone, Debug)]
pub struct PauseEvent;

#[derive(Clone, Debug)]
pub struct ResetPlaybackEvent;

// === Position ===

/// Move by N segments (negative = backward).
#[derive(Clone, Debug)]
pub struct StepEvent(pub i32);

/// Jump ten segments in the sign's direction.
#[derive(Clone, Debug)]
pub struct JumpEvent(pub i32);

#[derive(Clone, Debug)]
pub struct SeekEvent(pub usize);

// === Speed ===

#[derive(Clone, Debug)]
pub struct SetSpeedEvent(pub f64);

#[derive(Clone, Debug)]
pub struct FasterEvent;

#[derive(Clone, Debug)]
pub struct SlowerEvent;
