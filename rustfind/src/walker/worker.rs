//! Directory pool worker loop.
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::{MatchCandidate, SearchUnit, WalkSink};
use crate::engine::Shared;
use crate::errors::FindError;
use crate::results::FindOutput;
use crate::scheduler::{Pool, WorkerSlot};

/// Routes walker output into the run's queues
struct QueueSink<'a> {
    shared: &'a Shared,
}

impl WalkSink for QueueSink<'_> {
    fn push_unit(&mut self, unit: SearchUnit) {
        self.shared.directories.push(unit);
    }

    fn push_candidate(&mut self, candidate: MatchCandidate) {
        self.shared.candidates.push(candidate);
    }

    fn push_output(&mut self, output: FindOutput) {
        // The aggregator only disconnects once the run is over
        let _ = self.shared.outputs.send(output);
    }

    fn verbose(&mut self, message: String) {
        let _ = self.shared.verbose.send(message);
    }
}

/// Runs on a pool thread after the engine claimed a directory slot for it
pub(crate) fn run(shared: Arc<Shared>) {
    let mut slot = WorkerSlot::adopt(shared.scheduler.pools(), Pool::Directory);
    let mut processed = 0u64;

    loop {
        if shared.cancel.is_cancelled() || slot.retire_if_over() {
            break;
        }
        let Some(unit) = shared.directories.try_pop() else {
            break;
        };

        let completion = shared.directories.completion();
        let mut sink = QueueSink { shared: &shared };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| shared.walker.process(&unit, &mut sink)))
            .unwrap_or_else(|_| {
                Err(FindError::unexpected(format!(
                    "Directory worker panicked in {}",
                    unit.location.display()
                )))
            });

        match outcome {
            Ok(()) => trace!(location = %unit.location.display(), "Directory processed"),
            Err(FindError::Cancelled) => {}
            Err(e) => report_failure(&shared, &unit, e),
        }
        shared.metrics.record_directory_completed();
        processed += 1;
        drop(completion);

        shared.maintain();
        shared.sample();
    }

    drop(slot);
    trace!(processed, "Directory worker exiting");
    // Work pushed between the last empty pop and leaving the pool needs a worker
    if !shared.directories.is_empty() {
        shared.maintain();
    }
}

fn report_failure(shared: &Shared, unit: &SearchUnit, error: FindError) {
    match &error {
        FindError::PermissionDenied(_) => {
            debug!(location = %unit.location.display(), error = %error, "Directory skipped");
        }
        _ => warn!(location = %unit.location.display(), error = %error, "Directory failed"),
    }
    shared.metrics.record_error();
    let _ = shared
        .verbose
        .send(format!("Cannot read {}: {}", unit.location.display(), error));
}
