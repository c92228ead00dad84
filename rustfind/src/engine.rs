//! Run orchestration.
//!
//! [`Finder::run`] seeds the directory queue from the resolved masks, then
//! turns the caller's thread into the output aggregator: it drains results,
//! keeps both worker pools provisioned, schedules upward-search levels and
//! decides when the run is over. Workers live on a rayon pool and exit as
//! soon as their queue is empty, so the aggregator is the only loop that
//! survives an idle moment.
use crossbeam_channel::{unbounded, Receiver, Sender};
use encoding_rs::Encoding;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::cancel::CancellationToken;
use crate::config::FindConfig;
use crate::errors::{FindError, FindResult};
use crate::filters::EntryFilter;
use crate::mask::{lexical_normalize, MaskOptions, Resolver};
use crate::metrics::RunMetrics;
use crate::output::{is_unattended, Formatter, Progress};
use crate::platform::{NativePlatform, Platform};
use crate::results::{FindOutput, FindSummary};
use crate::scheduler::{memory_budget_per_worker, Observation, Pool, Scheduler, SchedulerLimits};
use crate::search::matcher::{MatchOptions, PatternMatcher};
use crate::search::processor::{ContentSearcher, SearchSettings};
use crate::search::reader::encoding_for_label;
use crate::walker::visited::default_case_sensitive;
use crate::walker::{
    self, MatchCandidate, SearchUnit, UpwardSearch, VisitedSet, WalkSettings, Walker, WorkQueue,
};

/// Longest the aggregator waits for output before re-checking the pools
const IDLE_WAIT: Duration = Duration::from_millis(10);

/// State shared by the aggregator and every worker of one run
pub(crate) struct Shared {
    pub(crate) walker: Walker,
    pub(crate) searcher: Option<ContentSearcher>,
    pub(crate) directories: WorkQueue<SearchUnit>,
    pub(crate) candidates: WorkQueue<MatchCandidate>,
    pub(crate) outputs: Sender<FindOutput>,
    pub(crate) verbose: Sender<String>,
    pub(crate) scheduler: Scheduler,
    pub(crate) metrics: RunMetrics,
    pub(crate) cancel: CancellationToken,
    output_backlog: Receiver<FindOutput>,
    verbose_backlog: Receiver<String>,
    threads: ThreadPool,
    maintenance: Mutex<()>,
}

impl Shared {
    /// Spawns workers for whichever pool is below its recommendation and has
    /// queued work. Safe to call from any thread at any time.
    pub(crate) fn maintain(self: &Arc<Self>) {
        if self.cancel.is_cancelled() {
            return;
        }
        let _guard = self.maintenance.lock().unwrap_or_else(PoisonError::into_inner);
        self.spawn_workers(Pool::Directory, self.directories.len());
        if self.searcher.is_some() {
            self.spawn_workers(Pool::Match, self.candidates.len());
        }
    }

    fn spawn_workers(self: &Arc<Self>, pool: Pool, queued: usize) {
        let pools = self.scheduler.pools();
        let limit = pools.recommended(pool).min(queued);
        while pools.try_join(pool, limit) {
            let shared = Arc::clone(self);
            trace!(?pool, active = pools.active(pool), "Spawning worker");
            match pool {
                Pool::Directory => self.threads.spawn(move || walker::worker::run(shared)),
                Pool::Match => self.threads.spawn(move || crate::search::worker::run(shared)),
            }
        }
    }

    /// Feeds the scheduler; only one caller per interval does any work
    pub(crate) fn sample(&self) {
        let observation = Observation {
            directory_queue: self.directories.len(),
            match_queue: self.candidates.len(),
            output_queue: self.output_backlog.len(),
            directories_completed: self.metrics.directories_completed(),
            candidates_searched: self.metrics.candidates_searched(),
            outputs_emitted: self.metrics.outputs_emitted(),
        };
        self.scheduler.maybe_sample(&observation);
    }

    fn is_idle(&self) -> bool {
        self.directories.pending() == 0 && self.candidates.pending() == 0
    }

    fn workers_stopped(&self) -> bool {
        let pools = self.scheduler.pools();
        pools.active(Pool::Directory) == 0 && pools.active(Pool::Match) == 0
    }
}

/// A configured search, runnable any number of times
pub struct Finder {
    config: FindConfig,
    platform: Arc<dyn Platform>,
    cancel: CancellationToken,
    matcher: Option<Arc<PatternMatcher>>,
    encoding: Option<&'static Encoding>,
    filter: EntryFilter,
    case_sensitive_paths: bool,
}

impl Finder {
    /// Validates the configuration and compiles every pattern. Invalid
    /// patterns, unknown encodings and bad values fail here, before any
    /// worker starts.
    pub fn new(config: FindConfig) -> FindResult<Self> {
        config.validate()?;
        let case_sensitive_paths = config
            .case_sensitive_paths
            .unwrap_or_else(default_case_sensitive);

        let matcher = if config.has_content_search() {
            let options = MatchOptions {
                case_sensitive: config.content.case_sensitive,
                simple_match: config.content.simple_match,
                culture: config.content.culture,
            };
            Some(Arc::new(PatternMatcher::new(&config.content.patterns, options)?))
        } else {
            None
        };
        let encoding = config
            .content
            .encoding
            .as_deref()
            .map(encoding_for_label)
            .transpose()?;

        let filter = EntryFilter::builder()
            .exclude_files(&config.exclude)
            .exclude_dirs(&config.exclude_directories)
            .size_bounds(config.min_file_size, config.max_file_size)
            .modified_bounds(config.modified_after, config.modified_before)
            .categories(&config.categories)
            .case_sensitive(case_sensitive_paths)
            .build()?;

        Ok(Self {
            config,
            platform: Arc::new(NativePlatform),
            cancel: CancellationToken::new(),
            matcher,
            encoding,
            filter,
            case_sensitive_paths,
        })
    }

    /// Replaces the host primitives used for shares, streams and drives
    pub fn with_platform(mut self, platform: Arc<dyn Platform>) -> Self {
        self.platform = platform;
        self
    }

    pub fn config(&self) -> &FindConfig {
        &self.config
    }

    /// Token that stops the current and every later run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the search and returns everything it produced
    pub fn collect(&self) -> FindResult<(Vec<FindOutput>, FindSummary)> {
        let mut outputs = Vec::new();
        let summary = self.run(|output| outputs.push(output))?;
        Ok((outputs, summary))
    }

    /// Runs the search, handing each result to `sink` on the calling thread.
    ///
    /// Cancellation (through the token or the configured timeout) ends the
    /// run early; whatever was already delivered stays delivered and the
    /// summary reports `cancelled`.
    pub fn run<F>(&self, mut sink: F) -> FindResult<FindSummary>
    where
        F: FnMut(FindOutput),
    {
        let started = Instant::now();
        let cancel = self.cancel.child(self.config.timeout());
        let base_dir = self.base_dir()?;
        let masks: Vec<String> = if self.config.names.is_empty() {
            vec!["*".to_string()]
        } else {
            self.config.names.clone()
        };
        info!("Starting find with masks: {:?}", masks);

        let resolver = Resolver::new(
            MaskOptions {
                recurse: !self.config.no_recurse,
                parse_streams: cfg!(windows),
                base_dir: base_dir.clone(),
            },
            self.roots(),
        );
        let resolved = resolver.resolve_all(&masks);
        let upward = UpwardSearch::new(&resolved, self.config.search_upward);

        let shared = Arc::new(self.shared(cancel.clone())?);
        let (outputs, verbose) = (&shared.output_backlog, &shared.verbose_backlog);
        for mask in &resolved {
            debug!(location = %mask.location.display(), mask = %mask.mask, "Seeding search unit");
            shared.directories.push(SearchUnit::from_mask(mask));
        }

        let attended = !is_unattended(self.config.unattended);
        let formatter = Formatter::new(&base_dir, self.config.pass_thru, attended);
        let mut progress = Progress::new(self.config.progress && attended);
        let mut emit = |output: FindOutput| {
            shared.metrics.record_output();
            sink(formatter.format(output));
        };

        loop {
            let drained = drain(verbose, |message| debug!("{}", message))
                + drain(outputs, &mut emit);

            shared.maintain();
            shared.sample();
            progress.tick(
                &shared.metrics.get_stats(),
                shared.directories.len(),
                shared.candidates.len(),
            );

            if cancel.is_cancelled() {
                if shared.workers_stopped() {
                    drain(outputs, &mut emit);
                    break;
                }
            } else if shared.is_idle() {
                let next = upward.next_level();
                if next.is_empty() {
                    drain(outputs, &mut emit);
                    break;
                }
                for unit in next {
                    shared.directories.push(unit);
                }
                continue;
            }

            if drained == 0 {
                // Workers hold senders through `shared`, so this only times out
                if let Ok(output) = outputs.recv_timeout(IDLE_WAIT) {
                    emit(output);
                }
            }
        }

        progress.finish();
        drain(verbose, |message| debug!("{}", message));
        let cancelled = cancel.is_cancelled();
        if cancelled {
            warn!("Find cancelled after {:?}", started.elapsed());
        }
        shared.metrics.log_stats();
        let summary = FindSummary {
            stats: shared.metrics.get_stats(),
            elapsed: started.elapsed(),
            cancelled,
        };
        info!(
            "Find complete. {} results from {} directories in {:?}",
            summary.stats.outputs_emitted, summary.stats.directories_completed, summary.elapsed
        );
        Ok(summary)
    }

    fn shared(&self, cancel: CancellationToken) -> FindResult<Shared> {
        let baseline = self.config.baseline_threads();
        let limits = SchedulerLimits::new(baseline);
        let threads = ThreadPoolBuilder::new()
            .num_threads(limits.total_threads())
            .thread_name(|i| format!("rustfind-worker-{}", i))
            .build()
            .map_err(|e| FindError::unexpected(format!("Cannot start worker threads: {}", e)))?;
        let metrics = RunMetrics::new();

        let content_search = self.matcher.is_some();
        let walker = Walker::new(
            WalkSettings {
                mode: self.config.mode,
                max_depth: self.config.max_recursion_depth,
                follow_symlinks: self.config.follow_symlinks,
                include_alternate_streams: self.config.include_alternate_streams,
                case_sensitive_paths: self.case_sensitive_paths,
                content_search,
            },
            self.filter.clone(),
            Arc::new(VisitedSet::new(self.case_sensitive_paths)),
            Arc::clone(&self.platform),
            metrics.clone(),
            cancel.clone(),
        );
        let searcher = self.matcher.as_ref().map(|matcher| {
            let content = &self.config.content;
            ContentSearcher::new(
                Arc::clone(matcher),
                SearchSettings {
                    all_matches: content.all_matches,
                    context_before: content.context_before,
                    context_after: content.context_after,
                    list: content.list,
                    quiet: content.quiet,
                    invert: content.not_match,
                    encoding: self.encoding,
                    memory_budget: self
                        .config
                        .memory_budget
                        .unwrap_or_else(|| memory_budget_per_worker(baseline)),
                },
                Arc::clone(&self.platform),
                cancel.clone(),
            )
        });

        let (outputs, output_backlog) = unbounded();
        let (verbose, verbose_backlog) = unbounded();
        Ok(Shared {
            walker,
            searcher,
            directories: WorkQueue::new(),
            candidates: WorkQueue::new(),
            outputs,
            verbose,
            scheduler: Scheduler::new(limits),
            metrics,
            cancel,
            output_backlog,
            verbose_backlog,
            threads,
            maintenance: Mutex::new(()),
        })
    }

    fn base_dir(&self) -> FindResult<PathBuf> {
        let dir = match &self.config.base_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .map_err(|e| FindError::config_error(format!("Cannot read current directory: {}", e)))?,
        };
        let dir = if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir()
                .map_err(|e| FindError::config_error(format!("Cannot read current directory: {}", e)))?
                .join(dir)
        };
        Ok(lexical_normalize(&dir))
    }

    fn roots(&self) -> Vec<PathBuf> {
        let mut roots = self.config.roots.clone();
        if self.config.all_drives {
            roots.extend(self.platform.drive_roots());
        } else {
            roots.extend(self.config.drives.iter().map(|d| drive_root(d)));
        }
        roots
    }
}

/// `C`, `C:` and `C:/` all name the root of drive C
fn drive_root(drive: &str) -> PathBuf {
    let letter = drive.trim_end_matches(['/', '\\']).trim_end_matches(':');
    if letter.len() == 1 && letter.chars().all(|c| c.is_ascii_alphabetic()) {
        PathBuf::from(format!("{}:/", letter.to_ascii_uppercase()))
    } else {
        Path::new(drive).to_path_buf()
    }
}

/// Hands every queued item to `f` without waiting; returns how many there were
fn drain<T>(receiver: &Receiver<T>, mut f: impl FnMut(T)) -> usize {
    let mut count = 0;
    while let Ok(item) = receiver.try_recv() {
        f(item);
        count += 1;
    }
    count
}
