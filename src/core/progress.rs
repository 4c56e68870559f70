//! Live job-progress channel (WebSocket).
//!
//! # Purpose
//!
//! The planning service pushes status updates for the running job over a
//! persistent WebSocket. This module owns that connection for the lifetime of
//! a session and forwards decoded [`JobUpdate`]s into the session loop.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐    crossbeam channel     ┌──────────────────┐
//! │ streetplan-progress      │  ──── JobUpdate ──────▶  │ Session::pump()  │
//! │ (tungstenite, blocking)  │                          │ (event loop)     │
//! └──────────────────────────┘                          └──────────────────┘
//! ```
//!
//! - Opened by [`ProgressChannel::open`], released by [`ProgressChannel::close`]
//!   or on drop.
//! - Malformed frames are logged and dropped; they never close the connection.
//! - Frames without a `status` field are ignored.
//! - The channel holds no expiry timer; see [`JobSlot`](super::job::JobSlot).
//! - On connection loss it reconnects with exponential backoff, up to
//!   [`ReconnectPolicy::attempts`] times (0 = never).

use crossbeam_channel::Sender;
use log::{debug, error, info, trace, warn};
use serde_json::Value;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message as WsMessage, WebSocket};

use super::job::JobUpdate;

/// Socket read timeout; bounds how long `close()` waits for the reader.
const READ_POLL: Duration = Duration::from_millis(200);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("failed to connect progress channel {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tungstenite::Error>,
    },
    #[error("failed to spawn progress reader: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Reconnect-with-backoff settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    pub fn never() -> Self {
        Self {
            attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before reconnect attempt `n` (0-based): base * 2^n, capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Decode one server frame. Returns None for frames that are not status updates.
pub fn parse_message(raw: &str) -> Option<JobUpdate> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("Dropping malformed progress message: {}", e);
            return None;
        }
    };
    if value.get("status").is_none() {
        debug!("Ignoring progress message without status");
        return None;
    }
    match serde_json::from_value::<JobUpdate>(value) {
        Ok(update) => Some(update),
        Err(e) => {
            warn!("Dropping invalid progress message: {}", e);
            None
        }
    }
}

/// Owned progress connection. Dropping it closes the socket and joins the reader.
pub struct ProgressChannel {
    url: String,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ProgressChannel {
    /// Connect to `url` and start forwarding updates to `updates`.
    ///
    /// The first connection attempt is synchronous so a wrong URL fails here.
    pub fn open(
        url: &str,
        policy: ReconnectPolicy,
        updates: Sender<JobUpdate>,
    ) -> Result<Self, ProgressError> {
        let ws = connect(url)?;
        info!("Progress channel connected to {}", url);

        let stop = Arc::new(AtomicBool::new(false));
        let reader = Reader {
            url: url.to_string(),
            policy,
            updates,
            stop: Arc::clone(&stop),
        };
        let handle = thread::Builder::new()
            .name("streetplan-progress".into())
            .spawn(move || reader.run(ws))?;

        Ok(Self {
            url: url.to_string(),
            stop,
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// True while the reader thread is alive (connected or reconnecting).
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Close the connection and wait for the reader to exit.
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Progress reader panicked");
            }
            info!("Progress channel closed");
        }
    }
}

impl Drop for ProgressChannel {
    fn drop(&mut self) {
        self.close();
    }
}

fn connect(url: &str) -> Result<Socket, ProgressError> {
    let (mut ws, _) = tungstenite::connect(url).map_err(|e| ProgressError::Connect {
        url: url.to_string(),
        source: Box::new(e),
    })?;
    if let MaybeTlsStream::Plain(stream) = ws.get_mut() {
        let _ = stream.set_read_timeout(Some(READ_POLL));
    }
    Ok(ws)
}

struct Reader {
    url: String,
    policy: ReconnectPolicy,
    updates: Sender<JobUpdate>,
    stop: Arc<AtomicBool>,
}

enum ReadEnd {
    Stopped,
    Lost(String),
}

impl Reader {
    fn run(self, ws: Socket) {
        let mut ws = ws;
        loop {
            match self.read_loop(&mut ws) {
                ReadEnd::Stopped => {
                    let _ = ws.close(None);
                    let _ = ws.flush();
                    return;
                }
                ReadEnd::Lost(reason) => {
                    warn!("Progress channel lost: {}", reason);
                    match self.reconnect() {
                        Some(next) => ws = next,
                        None => return,
                    }
                }
            }
        }
    }

    fn read_loop(&self, ws: &mut Socket) -> ReadEnd {
        while !self.stop.load(Ordering::SeqCst) {
            let message = match ws.read() {
                Ok(m) => m,
                Err(tungstenite::Error::Io(e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    continue;
                }
                Err(e) => return ReadEnd::Lost(e.to_string()),
            };

            let raw = match message {
                WsMessage::Text(text) => text.to_string(),
                WsMessage::Binary(bytes) => String::from_utf8_lossy(&bytes).to_string(),
                WsMessage::Close(_) => return ReadEnd::Lost("closed by server".into()),
                _ => continue,
            };
            trace!("Progress frame: {}", raw);

            if let Some(update) = parse_message(&raw) {
                if self.updates.send(update).is_err() {
                    // Session is gone
                    return ReadEnd::Stopped;
                }
            }
        }
        ReadEnd::Stopped
    }

    fn reconnect(&self) -> Option<Socket> {
        for attempt in 0..self.policy.attempts {
            let delay = self.policy.delay(attempt);
            if !self.sleep_unless_stopped(delay) {
                return None;
            }
            match connect(&self.url) {
                Ok(ws) => {
                    info!("Progress channel reconnected (attempt {})", attempt + 1);
                    return Some(ws);
                }
                Err(e) => warn!("Reconnect attempt {} failed: {}", attempt + 1, e),
            }
        }
        if self.policy.attempts > 0 {
            error!("Progress channel gave up after {} attempts", self.policy.attempts);
        }
        None
    }

    fn sleep_unless_stopped(&self, total: Duration) -> bool {
        let mut left = total;
        while !left.is_zero() {
            if self.stop.load(Ordering::SeqCst) {
                return false;
            }
            let chunk = left.min(READ_POLL);
            thread::sleep(chunk);
            left -= chunk;
        }
        !self.stop.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::JobStatus;

    #[test]
    fn test_parse_status_update() {
        let u = parse_message(r#"{"status":"planning","message":"Planning route for 12 nodes...","progress":40,"details":{"n_nodes":12}}"#).unwrap();
        assert_eq!(u.status, JobStatus::Planning);
        assert_eq!(u.progress, Some(40.0));
        assert_eq!(u.details.unwrap()["n_nodes"], 12);
    }

    #[test]
    fn test_parse_keeps_fractional_and_out_of_range_progress() {
        let u = parse_message(r#"{"status":"planning","message":"Solving","progress":42.5}"#).unwrap();
        assert_eq!(u.status, JobStatus::Planning);
        assert_eq!(u.progress, Some(42.5));

        let u = parse_message(r#"{"status":"exporting","message":"x","progress":300}"#).unwrap();
        assert_eq!(u.status, JobStatus::Exporting);
        assert_eq!(u.progress, Some(300.0));
    }

    #[test]
    fn test_parse_ignores_missing_status() {
        assert!(parse_message(r#"{"message":"hello"}"#).is_none());
    }

    #[test]
    fn test_parse_drops_garbage() {
        assert!(parse_message("Received: ping").is_none());
        assert!(parse_message(r#"{"status":42}"#).is_none());
        assert!(parse_message("").is_none());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(3), Duration::from_millis(4000));
        assert_eq!(policy.delay(10), Duration::from_secs(10));
        assert_eq!(policy.delay(40), Duration::from_secs(10));
    }

    #[test]
    fn test_open_unreachable_fails() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        // Port 9 (discard) on loopback is closed in test environments
        let result = ProgressChannel::open("ws://127.0.0.1:9/ws", ReconnectPolicy::never(), tx);
        assert!(matches!(result, Err(ProgressError::Connect { .. })));
    }
}
