//! Directory walking.
//!
//! A [`Walker`] processes one [`SearchUnit`] at a time: it lists the unit's
//! directory once, matches entries against the next mask segment and hands
//! everything it produces (child units, files, match candidates) to a
//! [`WalkSink`]. Threads and queues live in the engine.
pub mod queue;
pub mod upward;
pub mod visited;
pub(crate) mod worker;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, trace};

use crate::cancel::CancellationToken;
use crate::errors::{FindError, FindResult};
use crate::filters::{skips_stream_search, EntryFilter};
use crate::mask::{self, MaskStep};
use crate::metrics::RunMetrics;
use crate::platform::Platform;
use crate::results::{DirEntry, FileEntry, FindOutput};
use crate::wildcard::{has_wildcards, Wildcard};

pub use queue::WorkQueue;
pub use upward::UpwardSearch;
pub use visited::VisitedSet;

/// Which entry kinds a run reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryMode {
    #[default]
    Files,
    Directories,
    FilesAndDirectories,
}

impl EntryMode {
    pub fn wants_files(self) -> bool {
        matches!(self, EntryMode::Files | EntryMode::FilesAndDirectories)
    }

    pub fn wants_directories(self) -> bool {
        matches!(self, EntryMode::Directories | EntryMode::FilesAndDirectories)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitKind {
    Directory,
    /// `location` is `//machine`; its shares are listed instead of read
    ShareRoot { machine: String },
}

/// One directory to walk with the mask remaining at that level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchUnit {
    pub location: PathBuf,
    pub mask: String,
    /// Levels below the resolved location
    pub depth: usize,
    pub kind: UnitKind,
    /// Alternate stream requested through the mask
    pub stream: Option<String>,
}

impl SearchUnit {
    pub fn from_mask(resolved: &mask::ResolvedMask) -> Self {
        let kind = match &resolved.kind {
            mask::PathKind::Unc { machine, .. } if resolved.share_listing => UnitKind::ShareRoot {
                machine: machine.clone(),
            },
            _ => UnitKind::Directory,
        };
        Self {
            location: resolved.location.clone(),
            mask: resolved.mask.clone(),
            depth: 0,
            kind,
            stream: resolved.stream.clone(),
        }
    }

    fn child(&self, location: PathBuf, mask: &str) -> Self {
        Self {
            location,
            mask: mask.to_string(),
            depth: self.depth + 1,
            kind: UnitKind::Directory,
            stream: self.stream.clone(),
        }
    }
}

/// A file waiting for content search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCandidate {
    pub path: PathBuf,
    pub stream: Option<String>,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl MatchCandidate {
    pub fn into_entry(self) -> FileEntry {
        FileEntry {
            path: self.path,
            stream: self.stream,
            size: self.size,
            modified: self.modified,
        }
    }
}

/// Receives everything a walker produces for one unit
pub trait WalkSink {
    fn push_unit(&mut self, unit: SearchUnit);
    fn push_candidate(&mut self, candidate: MatchCandidate);
    fn push_output(&mut self, output: FindOutput);
    fn verbose(&mut self, message: String);
}

/// Per-run walker options
#[derive(Debug, Clone, Default)]
pub struct WalkSettings {
    pub mode: EntryMode,
    pub max_depth: Option<usize>,
    pub follow_symlinks: bool,
    pub include_alternate_streams: bool,
    pub case_sensitive_paths: bool,
    /// Files go to the content matcher instead of the output
    pub content_search: bool,
}

/// What a single directory level asks for
struct LevelPlan<'a> {
    /// Entries matching this are reported
    leaf: Option<Wildcard>,
    /// Child directories matching `segment` continue with `tail`
    descend: Option<(Wildcard, &'a str)>,
    /// Every child directory repeats the whole mask
    recurse_all: bool,
}

struct Child {
    path: PathBuf,
    name: String,
    is_dir: bool,
    is_symlink: bool,
    size: u64,
    modified: Option<SystemTime>,
}

pub struct Walker {
    settings: WalkSettings,
    filter: EntryFilter,
    visited: Arc<VisitedSet>,
    platform: Arc<dyn Platform>,
    metrics: RunMetrics,
    cancel: CancellationToken,
}

impl Walker {
    pub fn new(
        settings: WalkSettings,
        filter: EntryFilter,
        visited: Arc<VisitedSet>,
        platform: Arc<dyn Platform>,
        metrics: RunMetrics,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            filter,
            visited,
            platform,
            metrics,
            cancel,
        }
    }

    /// Processes one unit. Errors are scoped to this unit; whatever was
    /// already handed to the sink stays there.
    pub fn process(&self, unit: &SearchUnit, sink: &mut dyn WalkSink) -> FindResult<()> {
        self.cancel.check()?;

        if self.settings.max_depth.is_some_and(|max| unit.depth > max) {
            self.metrics.record_skipped();
            sink.verbose(format!(
                "Skipping {} (depth {} exceeds limit)",
                unit.location.display(),
                unit.depth
            ));
            return Ok(());
        }
        if !self.visited.insert(&self.visit_key(unit), &unit.mask) {
            self.metrics.record_skipped();
            sink.verbose(format!(
                "Skipping {} with mask {} (already visited)",
                unit.location.display(),
                unit.mask
            ));
            return Ok(());
        }

        self.metrics.record_directory_scanned();
        let children = match &unit.kind {
            UnitKind::Directory => self.list_directory(&unit.location)?,
            UnitKind::ShareRoot { machine } => self.list_shares(&unit.location, machine)?,
        };
        trace!(
            location = %unit.location.display(),
            mask = %unit.mask,
            entries = children.len(),
            "Listed directory"
        );

        let plan = self.plan(&unit.mask)?;
        for child in children {
            self.cancel.check()?;
            if child.is_dir {
                self.visit_directory(unit, &plan, child, sink);
            } else if let Some(leaf) = &plan.leaf {
                if self.settings.mode.wants_files() && leaf.matches(&child.name) {
                    self.visit_file(unit, child, sink);
                }
            }
        }
        Ok(())
    }

    /// Location a unit is recorded under in the visited set. With symlinks
    /// followed this is the resolved directory, so a link cycle or a second
    /// link to the same tree is walked once.
    fn visit_key(&self, unit: &SearchUnit) -> PathBuf {
        if self.settings.follow_symlinks && unit.kind == UnitKind::Directory {
            if let Ok(resolved) = fs::canonicalize(&unit.location) {
                return resolved;
            }
        }
        unit.location.clone()
    }

    fn plan<'a>(&self, mask: &'a str) -> FindResult<LevelPlan<'a>> {
        let case = self.settings.case_sensitive_paths;
        let (step, recurse_all) = match mask::step(mask) {
            MaskStep::Recursive { suffix } => (mask::step(suffix), true),
            other => (other, false),
        };
        let mut plan = LevelPlan {
            leaf: None,
            descend: None,
            recurse_all,
        };
        match step {
            MaskStep::Leaf(pattern) => plan.leaf = Some(Wildcard::new(pattern, case)?),
            MaskStep::Descend { segment, tail } => {
                plan.descend = Some((Wildcard::new(segment, case)?, tail));
            }
            MaskStep::Recursive { .. } => {
                return Err(FindError::invalid_pattern(format!("Malformed mask: {}", mask)))
            }
        }
        Ok(plan)
    }

    fn visit_directory(
        &self,
        unit: &SearchUnit,
        plan: &LevelPlan<'_>,
        child: Child,
        sink: &mut dyn WalkSink,
    ) {
        let full = slash_path(&child.path);
        if self.filter.is_excluded_dir(&full, &child.name) {
            self.metrics.record_skipped();
            sink.verbose(format!("Excluded directory {}", full));
            return;
        }

        if self.settings.mode.wants_directories() && !self.settings.content_search {
            if let Some(leaf) = &plan.leaf {
                if leaf.matches(&child.name) {
                    sink.push_output(FindOutput::Directory(DirEntry {
                        path: child.path.clone(),
                        modified: child.modified,
                    }));
                }
            }
        }

        if child.is_symlink && !self.settings.follow_symlinks {
            return;
        }
        if let Some((segment, tail)) = &plan.descend {
            if segment.matches(&child.name) {
                sink.push_unit(unit.child(child.path.clone(), tail));
            }
        }
        if plan.recurse_all {
            sink.push_unit(unit.child(child.path, &unit.mask));
        }
    }

    fn visit_file(&self, unit: &SearchUnit, child: Child, sink: &mut dyn WalkSink) {
        match unit.stream.as_deref() {
            Some(stream) => {
                for info in self.matching_streams(&child.path, stream) {
                    self.emit_file(&child, Some(info.name), info.size, sink);
                }
            }
            None => {
                let path = child.path.clone();
                let accepted = self.emit_file(&child, None, child.size, sink);
                if accepted && self.settings.include_alternate_streams && !skips_stream_search(&path) {
                    match self.platform.list_streams(&path) {
                        Ok(streams) => {
                            for info in streams {
                                self.emit_file(&child, Some(info.name), info.size, sink);
                            }
                        }
                        Err(e) => {
                            self.metrics.record_error();
                            debug!("Cannot list streams of {}: {}", path.display(), e);
                        }
                    }
                }
            }
        }
    }

    fn matching_streams(&self, path: &Path, stream: &str) -> Vec<crate::platform::StreamInfo> {
        let found = if has_wildcards(stream) {
            let pattern = match Wildcard::new(stream, false) {
                Ok(p) => p,
                Err(_) => return Vec::new(),
            };
            self.platform
                .list_streams(path)
                .map(|all| all.into_iter().filter(|s| pattern.matches(&s.name)).collect())
        } else {
            self.platform
                .stream_info(path, stream)
                .map(|info| info.into_iter().collect())
        };
        found.unwrap_or_else(|e| {
            debug!("Cannot read streams of {}: {}", path.display(), e);
            Vec::new()
        })
    }

    /// Applies the file filters and routes the entry. Returns whether it passed.
    fn emit_file(&self, child: &Child, stream: Option<String>, size: u64, sink: &mut dyn WalkSink) -> bool {
        let full = slash_path(&child.path);
        if let Err(rejection) =
            self.filter
                .check_file(&child.path, &full, &child.name, size, child.modified)
        {
            trace!("Filtered {}: {:?}", full, rejection);
            return false;
        }

        let candidate = MatchCandidate {
            path: child.path.clone(),
            stream,
            size,
            modified: child.modified,
        };
        if self.settings.content_search {
            self.metrics.record_candidate_queued();
            sink.push_candidate(candidate);
        } else {
            sink.push_output(FindOutput::File(candidate.into_entry()));
        }
        true
    }

    fn list_directory(&self, location: &Path) -> FindResult<Vec<Child>> {
        let entries = fs::read_dir(location).map_err(|e| FindError::io(location, e))?;
        let mut children = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry in {}: {}", location.display(), e);
                    continue;
                }
            };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            let is_symlink = file_type.is_symlink();
            // Symlinks report their target's kind and size
            let metadata = if is_symlink {
                fs::metadata(&path)
            } else {
                entry.metadata()
            };
            let Ok(metadata) = metadata else {
                trace!("Skipping dangling entry {}", path.display());
                continue;
            };
            children.push(Child {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: metadata.is_dir(),
                is_symlink,
                size: metadata.len(),
                modified: metadata.modified().ok(),
                path,
            });
        }
        Ok(children)
    }

    fn list_shares(&self, location: &Path, machine: &str) -> FindResult<Vec<Child>> {
        let shares = self
            .platform
            .list_shares(machine)
            .map_err(|e| FindError::io(location, e))?;
        Ok(shares
            .into_iter()
            .map(|share| Child {
                path: PathBuf::from(format!("//{}/{}", machine, share)),
                name: share,
                is_dir: true,
                is_symlink: false,
                size: 0,
                modified: None,
            })
            .collect())
    }
}

/// Path text with `/` separators, as matched by exclude patterns
pub(crate) fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
