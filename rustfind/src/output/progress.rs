use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::metrics::RunStats;

/// Fastest the spinner message is refreshed
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// Spinner showing live walk and match counters on stderr
pub struct Progress {
    bar: Option<ProgressBar>,
    last_update: Option<Instant>,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        let bar = enabled.then(|| {
            let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
            if let Ok(style) =
                ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
            {
                bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
            }
            bar
        });
        Self {
            bar,
            last_update: None,
        }
    }

    /// A progress display that draws nothing
    pub fn hidden() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.bar.is_some()
    }

    /// Refreshes the message; calls within [`REFRESH_INTERVAL`] of the last
    /// refresh are ignored. Returns whether the display was updated.
    pub fn tick(&mut self, stats: &RunStats, directory_queue: usize, match_queue: usize) -> bool {
        let Some(bar) = &self.bar else {
            return false;
        };
        let now = Instant::now();
        if self
            .last_update
            .is_some_and(|last| now.duration_since(last) < REFRESH_INTERVAL)
        {
            return false;
        }
        self.last_update = Some(now);
        bar.set_message(format!(
            "Dirs: {} ({} queued) | Files searched: {} ({} queued) | Results: {}",
            stats.directories_completed,
            directory_queue,
            stats.candidates_searched,
            match_queue,
            stats.outputs_emitted
        ));
        bar.tick();
        true
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}
