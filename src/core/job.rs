//! Planning job status and the single visible-job slot.
//!
//! A [`PlanningJob`] is created when a plan request goes out. Its status is
//! then driven by progress-channel updates and by the request's own terminal
//! response. Once terminal (`completed` / `error`) it stays visible for
//! [`JOB_CLEAR_DELAY`] and is then cleared.

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How long a finished or failed job stays visible.
pub const JOB_CLEAR_DELAY: Duration = Duration::from_millis(3000);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Loading,
    Planning,
    Exporting,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobStatus::Loading => "loading",
            JobStatus::Planning => "planning",
            JobStatus::Exporting => "exporting",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

/// Status update as pushed by the planning service.
///
/// `seq` is optional; when present, updates at or below the last accepted
/// sequence number are stale and dropped. `progress` is taken as sent (any
/// number) and clamped to 0-100 when the job is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub status: JobStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl JobUpdate {
    pub fn new(status: JobStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            progress: None,
            details: None,
            seq: None,
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(f64::from(progress.min(100)));
        self
    }
}

/// The job currently shown to the user.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlanningJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: Option<u8>,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl PlanningJob {
    pub fn from_update(id: Uuid, update: JobUpdate) -> Self {
        Self {
            id,
            status: update.status,
            progress: update.progress.map(percent),
            message: update.message,
            details: update.details,
        }
    }
}

/// Whole percent for display; out-of-range values are clamped.
fn percent(progress: f64) -> u8 {
    if progress.is_nan() {
        return 0;
    }
    progress.clamp(0.0, 100.0).round() as u8
}

/// Single slot holding the visible job plus its expiry.
#[derive(Debug, Default)]
pub struct JobSlot {
    job: Option<PlanningJob>,
    clear_at: Option<Instant>,
    last_seq: Option<u64>,
}

impl JobSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&PlanningJob> {
        self.job.as_ref()
    }

    /// When the visible job will be cleared, if it is terminal.
    pub fn clear_at(&self) -> Option<Instant> {
        self.clear_at
    }

    /// Start tracking a new job (a fresh plan request).
    pub fn begin(&mut self, id: Uuid, message: impl Into<String>) {
        self.job = Some(PlanningJob::from_update(
            id,
            JobUpdate::new(JobStatus::Loading, message),
        ));
        self.clear_at = None;
        self.last_seq = None;
    }

    /// Replace the visible job with `update`. Returns false for stale updates.
    pub fn apply(&mut self, update: JobUpdate, now: Instant) -> bool {
        if let (Some(seq), Some(last)) = (update.seq, self.last_seq) {
            if seq <= last {
                debug!("Dropping stale progress update seq={} (last {})", seq, last);
                return false;
            }
        }
        if update.seq.is_some() {
            self.last_seq = update.seq;
        }

        let id = self.job.as_ref().map(|j| j.id).unwrap_or_else(Uuid::new_v4);
        let job = PlanningJob::from_update(id, update);
        self.clear_at = job.status.is_terminal().then(|| now + JOB_CLEAR_DELAY);
        trace!("Job {} -> {} {:?}", job.id, job.status.name(), job.progress);
        self.job = Some(job);
        true
    }

    /// Clear the job once its display time is over. Returns true if it was cleared.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.clear_at {
            Some(at) if now >= at => {
                self.job = None;
                self.clear_at = None;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.job = None;
        self.clear_at = None;
    }
}

/// Identifies one outstanding plan request. Only the latest ticket's response
/// is applied; responses for superseded tickets are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobTicket {
    pub job_id: Uuid,
    pub serial: u64,
}

#[derive(Debug, Default)]
pub struct TicketCounter {
    serial: u64,
    current: Option<JobTicket>,
}

impl TicketCounter {
    /// Issue a ticket, superseding any outstanding one.
    pub fn issue(&mut self) -> JobTicket {
        self.serial += 1;
        let ticket = JobTicket {
            job_id: Uuid::new_v4(),
            serial: self.serial,
        };
        if let Some(old) = self.current.replace(ticket) {
            debug!("Plan request #{} superseded by #{}", old.serial, ticket.serial);
        }
        ticket
    }

    pub fn current(&self) -> Option<JobTicket> {
        self.current
    }

    pub fn is_in_flight(&self) -> bool {
        self.current.is_some()
    }

    /// Accept a response for `ticket`. Returns false (and keeps the slot) if stale.
    pub fn settle(&mut self, ticket: JobTicket) -> bool {
        if self.current == Some(ticket) {
            self.current = None;
            true
        } else {
            false
        }
    }
}
