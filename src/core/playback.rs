//! Segment playback with timer-driven autoplay.
//!
//! **Architecture**: the controller does NOT own the route. It only knows how
//! many segments exist; the session hands segment geometry to the renderer
//! using [`PlaybackController::visible_range`].
//!
//! # Timing Model
//!
//! Each segment is shown for `BASE_SEGMENT_DELAY / speed`. At most one advance
//! is pending at any time. Every operation that touches the index, the total,
//! the speed or the playing flag drops the pending advance; the next
//! [`tick`](PlaybackController::tick) arms a fresh one from that instant.
//! `tick()` is called from the session loop (~60Hz in the binary).
//!
//! # Controls
//!
//! - **Space**: play/pause
//! - **Left/Right**: step one segment
//! - **Shift+Left/Right**: jump ten segments
//! - **-/+**: previous/next speed preset
//!
//! Reaching the last segment while playing pauses (does not loop).

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::{Duration, Instant};

/// Speed presets, slowest first.
pub const SPEED_PRESETS: &[f64] = &[0.5, 1.0, 2.0, 4.0, 8.0];

/// Nominal per-segment display time at 1x.
pub const BASE_SEGMENT_DELAY: Duration = Duration::from_millis(500);

/// Segment count for Shift+Arrow jumps.
pub const SEGMENT_JUMP_STEP: i32 = 10;

/// Serializable playback snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub current: usize,
    pub total: usize,
    pub playing: bool,
    pub speed: f64,
}

/// Playback state manager (does NOT own segments).
#[derive(Clone, Debug)]
pub struct PlaybackController {
    current: usize,
    total: usize,
    playing: bool,
    speed: f64,
    /// Due time of the single pending advance (runtime only).
    pending_advance: Option<Instant>,
}

impl PlaybackController {
    pub fn new() -> Self {
        Self {
            current: 0,
            total: 0,
            playing: false,
            speed: 1.0,
            pending_advance: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            current: self.current,
            total: self.total,
            playing: self.playing,
            speed: self.speed,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Due time of the pending advance, if one is armed.
    pub fn next_due(&self) -> Option<Instant> {
        self.pending_advance
    }

    /// Current per-segment delay at the active speed.
    pub fn segment_delay(&self) -> Duration {
        BASE_SEGMENT_DELAY.div_f64(self.speed)
    }

    /// Segments drawn so far (first through current).
    pub fn visible_range(&self) -> Range<usize> {
        if self.total == 0 {
            0..0
        } else {
            0..self.current + 1
        }
    }

    pub fn at_start(&self) -> bool {
        self.current == 0
    }

    pub fn at_end(&self) -> bool {
        self.total == 0 || self.current + 1 >= self.total
    }

    fn last_index(&self) -> usize {
        self.total.saturating_sub(1)
    }

    fn invalidate(&mut self) {
        if self.pending_advance.take().is_some() {
            trace!("Pending advance cancelled");
        }
    }

    /// Replace the segment count. Index is clamped, not reset; resetting on a
    /// new route is the owner's job.
    pub fn set_total(&mut self, total: usize) {
        if total == self.total {
            return;
        }
        self.total = total;
        self.current = self.current.min(self.last_index());
        if total == 0 {
            self.playing = false;
        }
        self.invalidate();
    }

    /// Start advancing. Does nothing at the last segment.
    pub fn play(&mut self) {
        if self.at_end() {
            debug!("Nothing to play past segment {}", self.current);
            return;
        }
        if !self.playing {
            self.playing = true;
            self.invalidate();
            debug!("Playback started at segment {}", self.current);
        }
    }

    /// Stop advancing (always stops, doesn't toggle)
    pub fn pause(&mut self) {
        if self.playing {
            self.playing = false;
            self.invalidate();
            debug!("Playback paused at segment {}", self.current);
        }
    }

    pub fn toggle_play(&mut self) {
        if self.playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Move by `delta` segments, clamped to the route. Returns true if the index moved.
    pub fn step(&mut self, delta: i32) -> bool {
        if delta == 0 || self.total == 0 {
            return false;
        }
        let target = if delta > 0 {
            self.current.saturating_add(delta as usize).min(self.last_index())
        } else {
            self.current.saturating_sub(delta.unsigned_abs() as usize)
        };
        self.move_to(target)
    }

    /// Jump ten segments in the direction of `direction`'s sign.
    pub fn jump(&mut self, direction: i32) -> bool {
        self.step(direction.signum() * SEGMENT_JUMP_STEP)
    }

    /// Set index directly, clamped to `[0, total-1]`.
    pub fn seek(&mut self, index: usize) -> bool {
        if self.total == 0 {
            return false;
        }
        self.move_to(index.min(self.last_index()))
    }

    fn move_to(&mut self, index: usize) -> bool {
        if index == self.current {
            return false;
        }
        trace!("Segment {} -> {}", self.current, index);
        self.current = index;
        self.invalidate();
        true
    }

    /// Replace the speed multiplier. Only preset values are accepted.
    pub fn set_speed(&mut self, speed: f64) -> bool {
        let Some(preset) = SPEED_PRESETS.iter().copied().find(|p| (p - speed).abs() < 1e-9) else {
            debug!("Rejected speed {}", speed);
            return false;
        };
        if preset != self.speed {
            self.speed = preset;
            self.invalidate();
            debug!("Playback speed {}x", preset);
        }
        true
    }

    /// Next faster preset, if any.
    pub fn faster(&mut self) -> bool {
        match SPEED_PRESETS.iter().copied().find(|&s| s > self.speed) {
            Some(s) => self.set_speed(s),
            None => false,
        }
    }

    /// Next slower preset, if any.
    pub fn slower(&mut self) -> bool {
        match SPEED_PRESETS.iter().copied().rev().find(|&s| s < self.speed) {
            Some(s) => self.set_speed(s),
            None => false,
        }
    }

    /// Back to the first segment, paused.
    pub fn reset(&mut self) {
        self.current = 0;
        self.playing = false;
        self.invalidate();
    }

    /// Drive autoplay. Returns the new index when an advance fired.
    pub fn tick(&mut self, now: Instant) -> Option<usize> {
        if !self.playing {
            return None;
        }
        if self.at_end() {
            // Keep play/pause state consistent once there is nothing left to show
            self.pause();
            return None;
        }

        match self.pending_advance {
            None => {
                self.pending_advance = Some(now + self.segment_delay());
                None
            }
            Some(due) if now >= due => {
                self.pending_advance = None;
                self.step(1);
                if self.at_end() {
                    trace!("Reached last segment, pausing");
                    self.pause();
                } else {
                    // Keep the cadence; after a stall, restart from now
                    let delay = self.segment_delay();
                    let next = due + delay;
                    self.pending_advance = Some(if next > now { next } else { now + delay });
                }
                Some(self.current)
            }
            Some(_) => None,
        }
    }
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new()
    }
}

/// Which pass over a street a legend entry stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalPass {
    First,
    Second,
    ThirdOrLater,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LegendEntry {
    pub pass: TraversalPass,
    pub label: &'static str,
    pub color: &'static str,
}

impl TraversalPass {
    /// Pass bucket for a 1-based traversal count.
    pub fn from_count(count: u32) -> Self {
        match count {
            0 | 1 => TraversalPass::First,
            2 => TraversalPass::Second,
            _ => TraversalPass::ThirdOrLater,
        }
    }

    pub fn entry(&self) -> LegendEntry {
        match self {
            TraversalPass::First => LegendEntry { pass: *self, label: "1st pass", color: "#2563eb" },
            TraversalPass::Second => LegendEntry { pass: *self, label: "2nd pass", color: "#f59e0b" },
            TraversalPass::ThirdOrLater => LegendEntry { pass: *self, label: "3rd+ pass", color: "#dc2626" },
        }
    }
}

/// Legend rows for a route whose busiest street is traversed `max_traversal` times.
/// Empty when no street is revisited.
pub fn traversal_legend(max_traversal: u32) -> Vec<LegendEntry> {
    match max_traversal {
        0 | 1 => Vec::new(),
        2 => vec![TraversalPass::First.entry(), TraversalPass::Second.entry()],
        _ => vec![
            TraversalPass::First.entry(),
            TraversalPass::Second.entry(),
            TraversalPass::ThirdOrLater.entry(),
        ],
    }
}
