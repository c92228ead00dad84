//! Match pool worker loop.
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::engine::Shared;
use crate::errors::FindError;
use crate::scheduler::{Pool, WorkerSlot};
use crate::walker::MatchCandidate;

/// Runs on a pool thread after the engine claimed a match slot for it
pub(crate) fn run(shared: Arc<Shared>) {
    let Some(searcher) = shared.searcher.as_ref() else {
        shared.scheduler.pools().leave(Pool::Match);
        return;
    };
    let mut slot = WorkerSlot::adopt(shared.scheduler.pools(), Pool::Match);

    loop {
        if shared.cancel.is_cancelled() || slot.retire_if_over() {
            break;
        }
        let Some(candidate) = shared.candidates.try_pop() else {
            break;
        };

        let completion = shared.candidates.completion();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| searcher.search(&candidate)))
            .unwrap_or_else(|_| {
                Err(FindError::unexpected(format!(
                    "Match worker panicked in {}",
                    candidate.path.display()
                )))
            });

        match outcome {
            Ok(outcome) => {
                trace!(path = %candidate.path.display(), records = outcome.records, "File searched");
                shared
                    .metrics
                    .record_candidate_searched(outcome.bytes_read, outcome.records);
                for output in outcome.outputs {
                    let _ = shared.outputs.send(output);
                }
            }
            Err(FindError::Cancelled) => shared.metrics.record_candidate_searched(0, 0),
            Err(e) => {
                report_failure(&shared, &candidate, e);
                shared.metrics.record_candidate_searched(0, 0);
            }
        }
        drop(completion);

        shared.maintain();
        shared.sample();
    }

    drop(slot);
    if !shared.candidates.is_empty() {
        shared.maintain();
    }
}

fn report_failure(shared: &Shared, candidate: &MatchCandidate, error: FindError) {
    match &error {
        FindError::PermissionDenied(_) => {
            debug!(path = %candidate.path.display(), error = %error, "File skipped");
        }
        _ => warn!(path = %candidate.path.display(), error = %error, "Content search failed"),
    }
    shared.metrics.record_error();
    let _ = shared
        .verbose
        .send(format!("Cannot search {}: {}", candidate.path.display(), error));
}
