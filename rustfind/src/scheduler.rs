//! Adaptive worker scheduling.
//!
//! The scheduler never starts or stops workers itself. It publishes
//! recommended pool sizes in [`WorkerPoolState`]; the engine spawns workers
//! up to the recommendation and workers retire themselves when their pool
//! is over it.
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::System;
use tracing::debug;

/// Minimum time between two throughput samples
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

const GROW_DRAIN_SECS: f64 = 10.0;
const SHRINK_DRAIN_SECS: f64 = 2.0;
const BACKPRESSURE_RATIO: f64 = 0.1;

const MIN_MEMORY_BUDGET: u64 = 2 * 1024 * 1024;
const MAX_MEMORY_BUDGET: u64 = 50 * 1024 * 1024;

/// Physical core count, used as the baseline pool size
pub fn default_parallelism() -> usize {
    num_cpus::get_physical().max(1)
}

/// Per content worker buffer budget: 5% of available memory split across
/// the baseline workers, clamped to [2 MiB, 50 MiB].
pub fn memory_budget_per_worker(baseline: usize) -> usize {
    let mut sys = System::new();
    sys.refresh_memory();
    budget_from_available(sys.available_memory(), baseline)
}

fn budget_from_available(available: u64, baseline: usize) -> usize {
    let share = available / 20 / baseline.max(1) as u64;
    share.clamp(MIN_MEMORY_BUDGET, MAX_MEMORY_BUDGET) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Directory,
    Match,
}

/// Live and recommended worker counts for both pools
#[derive(Debug, Default)]
pub struct WorkerPoolState {
    directory_active: AtomicUsize,
    match_active: AtomicUsize,
    recommended_directory: AtomicUsize,
    recommended_match: AtomicUsize,
}

impl WorkerPoolState {
    fn active_counter(&self, pool: Pool) -> &AtomicUsize {
        match pool {
            Pool::Directory => &self.directory_active,
            Pool::Match => &self.match_active,
        }
    }

    fn recommended_counter(&self, pool: Pool) -> &AtomicUsize {
        match pool {
            Pool::Directory => &self.recommended_directory,
            Pool::Match => &self.recommended_match,
        }
    }

    pub fn active(&self, pool: Pool) -> usize {
        self.active_counter(pool).load(Ordering::SeqCst)
    }

    pub fn recommended(&self, pool: Pool) -> usize {
        self.recommended_counter(pool).load(Ordering::Relaxed)
    }

    pub fn set_recommended(&self, pool: Pool, value: usize) {
        self.recommended_counter(pool).store(value, Ordering::Relaxed);
    }

    /// Claims a worker slot if fewer than `limit` are live
    pub fn try_join(&self, pool: Pool, limit: usize) -> bool {
        self.active_counter(pool)
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                (live < limit).then_some(live + 1)
            })
            .is_ok()
    }

    /// Gives up a slot if the pool is above its recommendation
    pub fn try_retire(&self, pool: Pool) -> bool {
        let recommended = self.recommended(pool);
        self.active_counter(pool)
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                (live > recommended).then(|| live - 1)
            })
            .is_ok()
    }

    /// Releases a slot claimed by `try_join`
    pub fn leave(&self, pool: Pool) {
        self.active_counter(pool).fetch_sub(1, Ordering::SeqCst);
    }
}

/// One claimed worker slot, released when dropped
pub struct WorkerSlot<'a> {
    pools: &'a WorkerPoolState,
    pool: Pool,
    held: bool,
}

impl<'a> WorkerSlot<'a> {
    /// Takes ownership of a slot already claimed through `try_join`
    pub fn adopt(pools: &'a WorkerPoolState, pool: Pool) -> Self {
        Self {
            pools,
            pool,
            held: true,
        }
    }

    /// Releases the slot early when the pool is over its recommendation
    pub fn retire_if_over(&mut self) -> bool {
        if self.held && self.pools.try_retire(self.pool) {
            self.held = false;
        }
        !self.held
    }
}

impl Drop for WorkerSlot<'_> {
    fn drop(&mut self) {
        if self.held {
            self.pools.leave(self.pool);
        }
    }
}

/// Pool size bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerLimits {
    pub baseline: usize,
    pub directory_cap: usize,
    pub match_cap: usize,
}

impl SchedulerLimits {
    pub fn new(baseline: usize) -> Self {
        let baseline = baseline.max(1);
        Self {
            baseline,
            directory_cap: baseline * 2,
            match_cap: baseline * 3,
        }
    }

    /// Threads needed to run both pools at their caps
    pub fn total_threads(&self) -> usize {
        self.directory_cap + self.match_cap
    }
}

/// Load of one pool over the last sample window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolLoad {
    pub queue_len: usize,
    /// Items completed per second
    pub throughput: f64,
    pub active: usize,
    pub recommended: usize,
}

impl PoolLoad {
    fn drain_secs(&self) -> f64 {
        if self.queue_len == 0 {
            0.0
        } else if self.throughput > 0.0 {
            self.queue_len as f64 / self.throughput
        } else {
            f64::INFINITY
        }
    }
}

/// Recommended pool sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recommendation {
    pub directory: usize,
    pub matching: usize,
}

fn recommend_pool(load: &PoolLoad, baseline: usize, cap: usize) -> usize {
    let drain = load.drain_secs();
    let current = load.recommended;
    let next = if drain > GROW_DRAIN_SECS && current < cap {
        let step = (drain / GROW_DRAIN_SECS).ceil() as usize;
        cap.min(current.saturating_add(step))
    } else if drain < SHRINK_DRAIN_SECS && load.active > 1 {
        current.saturating_sub(1)
    } else {
        baseline.max(current)
    };
    next.clamp(1, cap)
}

/// Computes the next pool sizes from one sample window.
///
/// `output_backlog` is the number of items waiting for the aggregator;
/// backpressure only applies while it is non-zero.
pub fn recommend(
    limits: &SchedulerLimits,
    directory: &PoolLoad,
    matching: &PoolLoad,
    output_throughput: f64,
    output_backlog: usize,
) -> Recommendation {
    let mut dir = recommend_pool(directory, limits.baseline, limits.directory_cap);
    let mut matches = recommend_pool(matching, limits.baseline, limits.match_cap);

    // Directory scanning is done for now; lend its idle slots to matching.
    if directory.queue_len == 0 && matching.queue_len > 0 {
        let spare = limits.directory_cap.saturating_sub(directory.active);
        matches = limits.match_cap.min(matches.saturating_add(spare));
    }

    let fastest = directory.throughput.max(matching.throughput);
    if output_backlog > 0 && fastest > 0.0 && output_throughput < fastest * BACKPRESSURE_RATIO {
        dir /= 2;
        matches /= 2;
    }

    Recommendation {
        directory: dir.clamp(1, limits.directory_cap),
        matching: matches.clamp(1, limits.match_cap),
    }
}

/// Queue lengths and completion counters observed by the engine
#[derive(Debug, Clone, Copy, Default)]
pub struct Observation {
    pub directory_queue: usize,
    pub match_queue: usize,
    pub output_queue: usize,
    pub directories_completed: u64,
    pub candidates_searched: u64,
    pub outputs_emitted: u64,
}

#[derive(Debug)]
struct LastSample {
    directories_completed: u64,
    candidates_searched: u64,
    outputs_emitted: u64,
    at: Instant,
}

/// Samples throughput at most once per [`SAMPLE_INTERVAL`] and publishes
/// recommendations into the shared pool state.
#[derive(Debug)]
pub struct Scheduler {
    limits: SchedulerLimits,
    pools: WorkerPoolState,
    started: Instant,
    next_sample_ms: AtomicU64,
    last: Mutex<LastSample>,
}

impl Scheduler {
    pub fn new(limits: SchedulerLimits) -> Self {
        let pools = WorkerPoolState::default();
        pools.set_recommended(Pool::Directory, limits.baseline.min(limits.directory_cap));
        pools.set_recommended(Pool::Match, limits.baseline.min(limits.match_cap));
        let started = Instant::now();
        Self {
            limits,
            pools,
            started,
            next_sample_ms: AtomicU64::new(SAMPLE_INTERVAL.as_millis() as u64),
            last: Mutex::new(LastSample {
                directories_completed: 0,
                candidates_searched: 0,
                outputs_emitted: 0,
                at: started,
            }),
        }
    }

    pub fn pools(&self) -> &WorkerPoolState {
        &self.pools
    }

    /// Takes a sample if the interval has elapsed and no other thread won
    /// the race for it
    pub fn maybe_sample(&self, observation: &Observation) -> Option<Recommendation> {
        let now_ms = self.started.elapsed().as_millis() as u64;
        let due = self.next_sample_ms.load(Ordering::Acquire);
        if now_ms < due {
            return None;
        }
        let next = now_ms + SAMPLE_INTERVAL.as_millis() as u64;
        if self
            .next_sample_ms
            .compare_exchange(due, next, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }
        let mut last = self.last.lock().ok()?;
        Some(self.apply(&mut last, observation))
    }

    fn apply(&self, last: &mut LastSample, obs: &Observation) -> Recommendation {
        let now = Instant::now();
        let secs = now.duration_since(last.at).as_secs_f64().max(0.001);
        let rate = |current: u64, previous: u64| current.saturating_sub(previous) as f64 / secs;

        let directory = PoolLoad {
            queue_len: obs.directory_queue,
            throughput: rate(obs.directories_completed, last.directories_completed),
            active: self.pools.active(Pool::Directory),
            recommended: self.pools.recommended(Pool::Directory),
        };
        let matching = PoolLoad {
            queue_len: obs.match_queue,
            throughput: rate(obs.candidates_searched, last.candidates_searched),
            active: self.pools.active(Pool::Match),
            recommended: self.pools.recommended(Pool::Match),
        };
        let output = rate(obs.outputs_emitted, last.outputs_emitted);

        let next = recommend(&self.limits, &directory, &matching, output, obs.output_queue);
        debug!(
            dir_queue = directory.queue_len,
            dir_rate = directory.throughput,
            match_queue = matching.queue_len,
            match_rate = matching.throughput,
            output_rate = output,
            "Scheduler sample: directory workers {} -> {}, match workers {} -> {}",
            directory.recommended,
            next.directory,
            matching.recommended,
            next.matching
        );

        self.pools.set_recommended(Pool::Directory, next.directory);
        self.pools.set_recommended(Pool::Match, next.matching);
        *last = LastSample {
            directories_completed: obs.directories_completed,
            candidates_searched: obs.candidates_searched,
            outputs_emitted: obs.outputs_emitted,
            at: now,
        };
        next
    }
}
