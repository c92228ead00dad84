use encoding_rs::Encoding;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::trace;

use super::context::ContextTracker;
use super::matcher::PatternMatcher;
use super::pool::ScratchPool;
use super::reader::{Line, LineReader};
use crate::cancel::CancellationToken;
use crate::errors::{FindError, FindResult};
use crate::platform::Platform;
use crate::results::{FindOutput, MatchRecord};
use crate::walker::MatchCandidate;

/// Per-run content search behavior
#[derive(Debug, Clone, Default)]
pub struct SearchSettings {
    /// Record every occurrence on a line instead of the first
    pub all_matches: bool,
    pub context_before: usize,
    pub context_after: usize,
    /// Stop after the first record of each file
    pub list: bool,
    /// Report matching files without records
    pub quiet: bool,
    /// Report lines no pattern matches
    pub invert: bool,
    /// Forced source encoding; a byte order mark still wins
    pub encoding: Option<&'static Encoding>,
    /// Per-worker buffer budget in bytes
    pub memory_budget: usize,
}

/// Searches the content of one candidate at a time
pub struct ContentSearcher {
    matcher: Arc<PatternMatcher>,
    settings: SearchSettings,
    platform: Arc<dyn Platform>,
    scratch: ScratchPool,
    cancel: CancellationToken,
}

/// What one file produced
#[derive(Debug, Default)]
pub struct FileOutcome {
    pub outputs: Vec<FindOutput>,
    pub bytes_read: u64,
    pub records: u64,
}

impl ContentSearcher {
    pub fn new(
        matcher: Arc<PatternMatcher>,
        settings: SearchSettings,
        platform: Arc<dyn Platform>,
        cancel: CancellationToken,
    ) -> Self {
        let scratch = ScratchPool::new(settings.memory_budget);
        Self {
            matcher,
            settings,
            platform,
            scratch,
            cancel,
        }
    }

    /// Searches one file. Outputs are only returned once the whole file was
    /// read, so a failure part way through reports nothing for the file.
    pub fn search(&self, candidate: &MatchCandidate) -> FindResult<FileOutcome> {
        trace!("Searching content of {}", candidate.path.display());
        let source = self
            .platform
            .open(&candidate.path, candidate.stream.as_deref())
            .map_err(|e| FindError::io(&candidate.path, e))?;

        let settings = &self.settings;
        let matcher = &self.matcher;
        let mut scratch = self.scratch.checkout();
        let mut reader = LineReader::new(&mut scratch, settings.encoding, settings.memory_budget);
        let mut tracker = ContextTracker::new(settings.context_before, settings.context_after);
        let mut records: Vec<MatchRecord> = Vec::new();
        let mut file_matched = false;
        // Segments of an oversized line share one record
        let mut open: Option<MatchRecord> = None;
        let mut line_hit = false;

        let new_record = |line: &Line<'_>, pattern: &str, spans: &[(usize, usize)]| MatchRecord {
            path: candidate.path.clone(),
            stream: candidate.stream.clone(),
            line_number: line.number,
            line: line.text.to_string(),
            line_offset: line.start,
            pattern: pattern.to_string(),
            offsets: spans.iter().map(|(start, _)| line.start + start).collect(),
            lengths: spans.iter().map(|(_, len)| *len).collect(),
            context: None,
            ignore_case: matcher.ignore_case(),
        };

        let bytes_read = reader.for_each_line(source, &candidate.path, &self.cancel, |line| {
            let mut emit = |mut record: MatchRecord, context| {
                record.context = context;
                records.push(record);
            };
            let hit = matcher.find(line.text, settings.all_matches, line.overlap);
            line_hit |= hit.is_some();

            if let Some(hit) = hit.filter(|_| !settings.invert) {
                if settings.quiet {
                    file_matched = true;
                    return ControlFlow::Break(());
                }
                match open.as_mut() {
                    Some(record) if settings.all_matches => {
                        record.offsets.extend(hit.spans.iter().map(|(start, _)| line.start + start));
                        record.lengths.extend(hit.spans.iter().map(|(_, len)| *len));
                    }
                    Some(_) => {}
                    None => open = Some(new_record(&line, matcher.pattern_source(hit.pattern), &hit.spans)),
                }
            }
            if line.partial {
                return ControlFlow::Continue(());
            }

            let matched = std::mem::take(&mut line_hit);
            let record = if settings.invert {
                if matched {
                    None
                } else if settings.quiet {
                    file_matched = true;
                    return ControlFlow::Break(());
                } else {
                    Some(new_record(&line, "", &[(0, line.text.len())]))
                }
            } else {
                open.take()
            };
            match record {
                Some(record) => tracker.push_match(record, &mut emit),
                None => tracker.push_line(line.number, line.text, &mut emit),
            }
            if settings.list && !records.is_empty() {
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        })?;

        if settings.list && !records.is_empty() {
            tracker.discard();
            records.truncate(1);
        } else {
            tracker.finish(&mut |mut record: MatchRecord, context| {
                record.context = context;
                records.push(record);
            });
        }

        let outputs = if settings.quiet {
            if file_matched {
                vec![FindOutput::File(candidate.clone().into_entry())]
            } else {
                Vec::new()
            }
        } else {
            records.into_iter().map(FindOutput::Match).collect()
        };
        Ok(FileOutcome {
            records: outputs.len() as u64,
            outputs,
            bytes_read,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::NativePlatform;
    use crate::search::matcher::MatchOptions;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn searcher(patterns: &[&str], settings: SearchSettings) -> ContentSearcher {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        let matcher = PatternMatcher::new(&patterns, MatchOptions::default()).unwrap();
        ContentSearcher::new(
            Arc::new(matcher),
            SearchSettings {
                memory_budget: 1 << 20,
                ..settings
            },
            Arc::new(NativePlatform),
            CancellationToken::new(),
        )
    }

    fn candidate(path: &Path) -> MatchCandidate {
        MatchCandidate {
            path: path.to_path_buf(),
            stream: None,
            size: fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            modified: None,
        }
    }

    fn records(outcome: &FileOutcome) -> Vec<&MatchRecord> {
        outcome
            .outputs
            .iter()
            .filter_map(|o| match o {
                FindOutput::Match(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_every_line_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("many.txt");
        let mut content = String::new();
        for i in 0..2000 {
            content.push_str(&format!("Line {} with pattern_{}", i, i));
            if i % 3 == 0 {
                content.push_str(" extra text to vary line length");
            }
            content.push('\n');
        }
        fs::write(&path, content).unwrap();

        let outcome = searcher(&[r"pattern_\d+"], SearchSettings::default())
            .search(&candidate(&path))
            .unwrap();
        let found = records(&outcome);
        assert_eq!(found.len(), 2000);
        let mut prev = 0;
        for record in found {
            assert!(record.line_number > prev, "line numbers should increase");
            assert_eq!(record.matched_text().count(), 1);
            prev = record.line_number;
        }
    }

    #[test]
    fn test_needle_at_line_one() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.txt");
        fs::write(&path, "needle\n").unwrap();

        let outcome = searcher(&["needle"], SearchSettings::default())
            .search(&candidate(&path))
            .unwrap();
        let found = records(&outcome);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line_number, 1);
        assert_eq!(found[0].offsets, vec![0]);
        assert_eq!(found[0].lengths, vec![6]);
        assert!(found[0].ignore_case);
        assert!(found[0].context.is_none());
    }

    #[test]
    fn test_context_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ctx.txt");
        fs::write(&path, "L1\nL2\nL3 hit\nL4\nL5\n").unwrap();

        let settings = SearchSettings {
            context_before: 2,
            context_after: 1,
            ..Default::default()
        };
        let outcome = searcher(&["hit"], settings).search(&candidate(&path)).unwrap();
        let found = records(&outcome);
        let ctx = found[0].context.as_ref().unwrap();
        assert_eq!(ctx.pre, vec!["L1", "L2"]);
        assert_eq!(ctx.post, vec!["L4"]);
    }

    #[test]
    fn test_quiet_reports_file_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q.txt");
        fs::write(&path, "a\nneedle\nneedle\n").unwrap();

        let settings = SearchSettings {
            quiet: true,
            ..Default::default()
        };
        let outcome = searcher(&["needle"], settings.clone()).search(&candidate(&path)).unwrap();
        assert!(matches!(&outcome.outputs[..], [FindOutput::File(f)] if f.path == path));

        fs::write(&path, "nothing here\n").unwrap();
        let outcome = searcher(&["needle"], settings).search(&candidate(&path)).unwrap();
        assert!(outcome.outputs.is_empty());
    }

    #[test]
    fn test_quiet_stops_at_first_hit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.txt");
        let mut body = String::from("needle\n");
        body.push_str(&"filler line\n".repeat(30_000));
        fs::write(&path, &body).unwrap();

        let settings = SearchSettings {
            quiet: true,
            ..Default::default()
        };
        let outcome = searcher(&["needle"], settings).search(&candidate(&path)).unwrap();
        assert_eq!(outcome.outputs.len(), 1);
        assert_eq!(outcome.records, 1);
        assert!(outcome.bytes_read < body.len() as u64);
    }

    #[test]
    fn test_list_keeps_first_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("l.txt");
        fs::write(&path, "x1\nx2\nx3\n").unwrap();

        let settings = SearchSettings {
            list: true,
            context_after: 1,
            ..Default::default()
        };
        let outcome = searcher(&["x"], settings).search(&candidate(&path)).unwrap();
        let found = records(&outcome);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line_number, 1);
    }

    #[test]
    fn test_invert_reports_non_matching_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("i.txt");
        fs::write(&path, "keep me\ndrop needle\nkeep too\n").unwrap();

        let settings = SearchSettings {
            invert: true,
            ..Default::default()
        };
        let outcome = searcher(&["needle"], settings).search(&candidate(&path)).unwrap();
        let lines: Vec<&str> = records(&outcome).iter().map(|r| r.line.as_str()).collect();
        assert_eq!(lines, vec!["keep me", "keep too"]);
    }

    #[test]
    fn test_all_matches() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("all.txt");
        fs::write(&path, "ab ab ab\n").unwrap();

        let settings = SearchSettings {
            all_matches: true,
            ..Default::default()
        };
        let outcome = searcher(&["ab"], settings).search(&candidate(&path)).unwrap();
        assert_eq!(records(&outcome)[0].offsets, vec![0, 3, 6]);

        let outcome = searcher(&["ab"], SearchSettings::default())
            .search(&candidate(&path))
            .unwrap();
        assert_eq!(records(&outcome)[0].offsets, vec![0]);
    }

    #[test]
    fn test_oversized_line_yields_one_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("long.txt");
        let line = "needle".to_string() + &"x".repeat(100) + "needle" + &"y".repeat(100) + "needle";
        fs::write(&path, format!("{}\nshort needle\n", line)).unwrap();

        let patterns = vec!["needle".to_string()];
        let matcher = Arc::new(PatternMatcher::new(&patterns, MatchOptions::default()).unwrap());
        let small = |all_matches| {
            ContentSearcher::new(
                matcher.clone(),
                SearchSettings {
                    all_matches,
                    memory_budget: 64,
                    ..Default::default()
                },
                Arc::new(NativePlatform),
                CancellationToken::new(),
            )
        };

        let outcome = small(true).search(&candidate(&path)).unwrap();
        let found = records(&outcome);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].line_number, 1);
        assert_eq!(found[0].offsets, vec![0, 106, 212]);
        assert_eq!(found[0].lengths, vec![6, 6, 6]);
        assert!(found[0].matched_text().all(|t| t == "needle"));
        assert_eq!(found[1].line_number, 2);
        assert_eq!(found[1].offsets, vec![6]);

        let outcome = small(false).search(&candidate(&path)).unwrap();
        let found = records(&outcome);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].offsets, vec![0]);
        assert_eq!(found[0].matched_text().collect::<Vec<_>>(), vec!["needle"]);
    }

    #[test]
    fn test_context_numbers_skip_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gaps.txt");
        fs::write(&path, "L1\n\nL3\nhit\n\nL6\n").unwrap();

        let settings = SearchSettings {
            context_before: 2,
            context_after: 1,
            ..Default::default()
        };
        let outcome = searcher(&["hit"], settings).search(&candidate(&path)).unwrap();
        let found = records(&outcome);
        assert_eq!(found[0].line_number, 4);
        let ctx = found[0].context.as_ref().unwrap();
        assert_eq!(ctx.pre, vec!["L1", "L3"]);
        assert_eq!(ctx.pre_lines, vec![1, 3]);
        assert_eq!(ctx.post, vec!["L6"]);
        assert_eq!(ctx.post_lines, vec![6]);
    }

    #[test]
    fn test_stream_candidate_is_searched() {
        use crate::platform::fake::FakePlatform;

        let dir = tempdir().unwrap();
        let path = dir.path().join("host.txt");
        fs::write(&path, "nothing here\n").unwrap();
        let mut platform = FakePlatform::default();
        platform.streams.insert(
            path.clone(),
            vec![("notes".to_string(), "first\nsecret needle\n".to_string())],
        );

        let patterns = vec!["needle".to_string()];
        let searcher = ContentSearcher::new(
            Arc::new(PatternMatcher::new(&patterns, MatchOptions::default()).unwrap()),
            SearchSettings {
                memory_budget: 1 << 20,
                ..Default::default()
            },
            Arc::new(platform),
            CancellationToken::new(),
        );

        let stream = MatchCandidate {
            stream: Some("notes".to_string()),
            ..candidate(&path)
        };
        let outcome = searcher.search(&stream).unwrap();
        let found = records(&outcome);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].stream.as_deref(), Some("notes"));
        assert_eq!(found[0].line_number, 2);
        assert_eq!(found[0].display_path(), format!("{}:notes", path.display()));

        assert!(searcher.search(&candidate(&path)).unwrap().outputs.is_empty());
    }

    #[test]
    fn test_missing_file_reports_nothing() {
        let dir = tempdir().unwrap();
        let err = searcher(&["x"], SearchSettings::default())
            .search(&candidate(&dir.path().join("gone.txt")))
            .unwrap_err();
        assert!(matches!(err, FindError::Io { .. }));
    }
}
