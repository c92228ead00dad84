//! Output items produced by a run.
//!
//! Every item is immutable once it reaches the output queue. Serialization is
//! used by the command line's JSON-lines mode.
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::metrics::RunStats;

fn serialize_time<S: Serializer>(time: &Option<SystemTime>, s: S) -> Result<S::Ok, S::Error> {
    match time {
        Some(t) => s.serialize_some(&humantime::format_rfc3339_seconds(*t).to_string()),
        None => s.serialize_none(),
    }
}

/// A file (or an alternate stream of one) that passed every filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub path: PathBuf,
    /// Alternate stream name when this entry stands for a stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    pub size: u64,
    #[serde(serialize_with = "serialize_time")]
    pub modified: Option<SystemTime>,
}

impl FileEntry {
    /// Path as displayed, with `:stream` appended for streams
    pub fn display_path(&self) -> String {
        join_stream(&self.path, self.stream.as_deref())
    }
}

/// A directory selected for output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub path: PathBuf,
    #[serde(serialize_with = "serialize_time")]
    pub modified: Option<SystemTime>,
}

/// Lines surrounding a match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchContext {
    pub pre: Vec<String>,
    pub post: Vec<String>,
    /// Line numbers, parallel to `pre`
    pub pre_lines: Vec<u64>,
    /// Line numbers, parallel to `post`
    pub post_lines: Vec<u64>,
}

/// One line of content that matched (or, when inverted, did not match)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    /// 1-based line number
    pub line_number: u64,
    /// Trimmed line text. For lines longer than the reader's buffer budget
    /// this is the segment holding the first occurrence.
    pub line: String,
    /// Byte offset of `line` within the full trimmed line
    #[serde(skip_serializing_if = "is_zero")]
    pub line_offset: usize,
    /// Source text of the pattern that matched, empty for inverted records
    pub pattern: String,
    /// Byte offsets of each occurrence within the full trimmed line
    pub offsets: Vec<usize>,
    /// Byte lengths, parallel to `offsets`
    pub lengths: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<MatchContext>,
    pub ignore_case: bool,
}

impl MatchRecord {
    pub fn display_path(&self) -> String {
        join_stream(&self.path, self.stream.as_deref())
    }

    /// Occurrences as `(start, len)` within `line`. Occurrences of an
    /// oversized line that fall outside the kept segment are left out.
    pub fn line_spans(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.offsets
            .iter()
            .zip(&self.lengths)
            .filter_map(|(&start, &len)| {
                let start = start.checked_sub(self.line_offset)?;
                (start + len <= self.line.len()).then_some((start, len))
            })
    }

    /// The text of each recorded occurrence within `line`
    pub fn matched_text(&self) -> impl Iterator<Item = &str> + '_ {
        self.line_spans()
            .filter_map(|(start, len)| self.line.get(start..start + len))
    }
}

/// Tagged output item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FindOutput {
    File(FileEntry),
    Directory(DirEntry),
    Match(MatchRecord),
    /// Plain formatted path, produced unless descriptors are passed through
    PathString(String),
}

impl FindOutput {
    /// Filesystem path this item refers to, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            FindOutput::File(f) => Some(&f.path),
            FindOutput::Directory(d) => Some(&d.path),
            FindOutput::Match(m) => Some(&m.path),
            FindOutput::PathString(_) => None,
        }
    }

    /// Single-line JSON form, one object per result
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Totals reported when a run finishes
#[derive(Debug, Clone, Default, Serialize)]
pub struct FindSummary {
    pub stats: RunStats,
    pub elapsed: Duration,
    /// The run stopped early through cancellation or its deadline
    pub cancelled: bool,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

fn join_stream(path: &Path, stream: Option<&str>) -> String {
    let base = path.to_string_lossy();
    match stream {
        Some(stream) => format!("{}:{}", base, stream),
        None => base.into_owned(),
    }
}
