//! Terminal status: one line for the planning job, one bar for playback.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::core::job::{JobStatus, PlanningJob};
use crate::core::playback::{LegendEntry, PlaybackState};

pub struct StatusBar {
    multi: MultiProgress,
    job_line: ProgressBar,
    playback_bar: ProgressBar,
}

impl StatusBar {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Status that draws nothing (output redirected, tests).
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);

        let job_line = multi.add(ProgressBar::new(100));
        job_line.set_style(job_style(false));
        job_line.set_message("Idle");

        let playback_bar = multi.add(ProgressBar::new(0));
        playback_bar.set_style(
            ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos}/{len} segments | {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );

        Self {
            multi,
            job_line,
            playback_bar,
        }
    }

    /// Show the visible job (None = cleared).
    pub fn set_job(&self, job: Option<&PlanningJob>) {
        let Some(job) = job else {
            self.job_line.set_style(job_style(false));
            self.job_line.set_position(0);
            self.job_line.set_message("Idle");
            return;
        };
        let determinate = job.progress.is_some() || job.status.is_terminal();
        self.job_line.set_style(job_style(determinate));
        let position = match (job.status, job.progress) {
            (JobStatus::Completed, _) => 100,
            (_, Some(p)) => p.min(100) as u64,
            _ => 0,
        };
        self.job_line.set_position(position);
        self.job_line.set_message(format!("[{}] {}", job.status.name(), job.message));
        if !determinate {
            self.job_line.tick();
        }
    }

    pub fn set_playback(&self, state: &PlaybackState) {
        self.playback_bar.set_length(state.total as u64);
        let shown = if state.total == 0 { 0 } else { state.current + 1 };
        self.playback_bar.set_position(shown as u64);
        let mode = if state.playing { "playing" } else { "paused" };
        self.playback_bar.set_message(format!("{} {}x", mode, state.speed));
    }

    pub fn set_legend(&self, legend: &[LegendEntry]) {
        if legend.is_empty() {
            return;
        }
        let rows: Vec<String> = legend.iter().map(|e| format!("{} {}", e.label, e.color)).collect();
        self.println(format!("Legend: {}", rows.join(", ")));
    }

    /// Print above the bars without tearing them.
    pub fn println(&self, line: impl AsRef<str>) {
        // Draw target may be hidden; then print directly
        if self.multi.is_hidden() {
            println!("{}", line.as_ref());
        } else {
            let _ = self.multi.println(line);
        }
    }

    pub fn finish(&self) {
        self.job_line.finish();
        self.playback_bar.finish();
    }
}

impl Default for StatusBar {
    fn default() -> Self {
        Self::new()
    }
}

fn job_style(determinate: bool) -> ProgressStyle {
    let template = if determinate {
        "{bar:20.green/white} {pos:>3}% {msg}"
    } else {
        "{spinner} {msg}"
    };
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::JobUpdate;
    use uuid::Uuid;

    #[test]
    fn test_hidden_status_tracks_job_and_playback() {
        let status = StatusBar::hidden();
        let job = PlanningJob::from_update(
            Uuid::new_v4(),
            JobUpdate::new(JobStatus::Planning, "Solving").with_progress(40),
        );
        status.set_job(Some(&job));
        assert_eq!(status.job_line.position(), 40);
        assert_eq!(status.job_line.message(), "[planning] Solving");

        status.set_job(None);
        assert_eq!(status.job_line.message(), "Idle");

        status.set_playback(&PlaybackState {
            current: 4,
            total: 10,
            playing: true,
            speed: 2.0,
        });
        assert_eq!(status.playback_bar.position(), 5);
        assert_eq!(status.playback_bar.length(), Some(10));
    }
}
