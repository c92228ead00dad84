use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use serde::Serialize;
use tracing::{debug, info};

/// Tracks progress and throughput counters for a single run
#[derive(Debug, Clone)]
pub struct RunMetrics {
    // Directory walker
    directories_scanned: Arc<AtomicU64>,
    directories_completed: Arc<AtomicU64>,
    units_skipped: Arc<AtomicU64>,

    // Content matcher
    candidates_queued: Arc<AtomicU64>,
    candidates_searched: Arc<AtomicU64>,
    matches_completed: Arc<AtomicU64>,
    bytes_read: Arc<AtomicU64>,

    // Output
    outputs_emitted: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            directories_scanned: Arc::new(AtomicU64::new(0)),
            directories_completed: Arc::new(AtomicU64::new(0)),
            units_skipped: Arc::new(AtomicU64::new(0)),
            candidates_queued: Arc::new(AtomicU64::new(0)),
            candidates_searched: Arc::new(AtomicU64::new(0)),
            matches_completed: Arc::new(AtomicU64::new(0)),
            bytes_read: Arc::new(AtomicU64::new(0)),
            outputs_emitted: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a directory listing being started
    pub fn record_directory_scanned(&self) {
        self.directories_scanned.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a search unit finished, whether it succeeded or not
    pub fn record_directory_completed(&self) {
        self.directories_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a unit dropped as visited, too deep, or excluded
    pub fn record_skipped(&self) {
        self.units_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candidate_queued(&self) {
        self.candidates_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a file whose content search finished
    pub fn record_candidate_searched(&self, bytes: u64, records: u64) {
        self.candidates_searched.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
        self.matches_completed.fetch_add(records, Ordering::Relaxed);
    }

    pub fn record_output(&self) {
        self.outputs_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        let total = self.errors.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Errors so far: {}", total);
    }

    pub fn directories_completed(&self) -> u64 {
        self.directories_completed.load(Ordering::Relaxed)
    }

    pub fn candidates_searched(&self) -> u64 {
        self.candidates_searched.load(Ordering::Relaxed)
    }

    pub fn outputs_emitted(&self) -> u64 {
        self.outputs_emitted.load(Ordering::Relaxed)
    }

    /// Gets a snapshot of every counter
    pub fn get_stats(&self) -> RunStats {
        RunStats {
            directories_scanned: self.directories_scanned.load(Ordering::Relaxed),
            directories_completed: self.directories_completed.load(Ordering::Relaxed),
            units_skipped: self.units_skipped.load(Ordering::Relaxed),
            candidates_queued: self.candidates_queued.load(Ordering::Relaxed),
            candidates_searched: self.candidates_searched.load(Ordering::Relaxed),
            match_records: self.matches_completed.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            outputs_emitted: self.outputs_emitted.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Logs the current counters
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Run stats:\n\
             Directories scanned/completed: {}/{}\n\
             Units skipped: {}\n\
             Files queued/searched: {}/{}\n\
             Match records: {}\n\
             Bytes read: {}\n\
             Outputs: {}\n\
             Errors: {}",
            stats.directories_scanned,
            stats.directories_completed,
            stats.units_skipped,
            stats.candidates_queued,
            stats.candidates_searched,
            stats.match_records,
            stats.bytes_read,
            stats.outputs_emitted,
            stats.errors
        );
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter snapshot of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub directories_scanned: u64,
    pub directories_completed: u64,
    pub units_skipped: u64,
    pub candidates_queued: u64,
    pub candidates_searched: u64,
    pub match_records: u64,
    pub bytes_read: u64,
    pub outputs_emitted: u64,
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_tracking() {
        let metrics = RunMetrics::new();

        metrics.record_directory_scanned();
        metrics.record_directory_scanned();
        metrics.record_directory_completed();
        metrics.record_skipped();

        let stats = metrics.get_stats();
        assert_eq!(stats.directories_scanned, 2);
        assert_eq!(stats.directories_completed, 1);
        assert_eq!(stats.units_skipped, 1);
    }

    #[test]
    fn test_candidate_tracking() {
        let metrics = RunMetrics::new();

        metrics.record_candidate_queued();
        metrics.record_candidate_searched(1024, 3);
        metrics.record_candidate_searched(10, 0);

        let stats = metrics.get_stats();
        assert_eq!(stats.candidates_queued, 1);
        assert_eq!(stats.candidates_searched, 2);
        assert_eq!(stats.bytes_read, 1034);
        assert_eq!(stats.match_records, 3);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = RunMetrics::new();
        let clone = metrics.clone();

        clone.record_output();
        clone.record_error();

        assert_eq!(metrics.outputs_emitted(), 1);
        assert_eq!(metrics.get_stats().errors, 1);
    }
}
