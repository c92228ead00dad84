use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

use crate::errors::{FindError, FindResult};

const SIMPLE_PATTERN_THRESHOLD: usize = 32;

static PATTERN_CACHE: Lazy<DashMap<String, MatchStrategy>> = Lazy::new(DashMap::new);

/// Case folding rules for case-insensitive matching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Culture {
    /// Full Unicode simple case folding
    #[default]
    Current,
    /// ASCII-only folding and character classes where the pattern allows it
    Invariant,
}

/// Strategy for pattern matching
#[derive(Debug, Clone)]
pub enum MatchStrategy {
    Simple(String),
    Regex(Arc<Regex>),
}

/// Options applied to every pattern of a matcher
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions {
    pub case_sensitive: bool,
    /// Treat patterns as literal text
    pub simple_match: bool,
    pub culture: Culture,
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    source: String,
    strategy: MatchStrategy,
}

/// Where a line matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    /// Index of the first pattern that hit
    pub pattern: usize,
    /// `(offset, length)` pairs in bytes
    pub spans: Vec<(usize, usize)>,
}

/// Compiled content patterns, evaluated in order
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    patterns: Vec<CompiledPattern>,
    options: MatchOptions,
}

impl PatternMatcher {
    /// Compiles every pattern; the first invalid one fails the whole set
    pub fn new(patterns: &[String], options: MatchOptions) -> FindResult<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Ok(CompiledPattern {
                    source: pattern.clone(),
                    strategy: Self::strategy_for(pattern, &options)?,
                })
            })
            .collect::<FindResult<Vec<_>>>()?;
        Ok(Self { patterns, options })
    }

    fn strategy_for(pattern: &str, options: &MatchOptions) -> FindResult<MatchStrategy> {
        let key = format!(
            "{}|{}|{}|{:?}",
            options.case_sensitive, options.simple_match, pattern, options.culture
        );
        if let Some(entry) = PATTERN_CACHE.get(&key) {
            trace!("Pattern cache hit: {}", pattern);
            return Ok(entry.clone());
        }

        let literal = options.simple_match || Self::is_simple_pattern(pattern);
        let strategy = if literal && options.case_sensitive {
            MatchStrategy::Simple(pattern.to_string())
        } else {
            let source = if options.simple_match {
                regex::escape(pattern)
            } else {
                pattern.to_string()
            };
            MatchStrategy::Regex(Arc::new(Self::build_regex(&source, options)?))
        };

        PATTERN_CACHE.insert(key, strategy.clone());
        Ok(strategy)
    }

    fn build_regex(source: &str, options: &MatchOptions) -> FindResult<Regex> {
        let mut builder = RegexBuilder::new(source);
        builder.case_insensitive(!options.case_sensitive);
        if options.culture == Culture::Invariant {
            // Patterns that could match non-UTF-8 input need Unicode mode
            if let Ok(regex) = builder.clone().unicode(false).build() {
                return Ok(regex);
            }
        }
        builder
            .build()
            .map_err(|e| FindError::invalid_pattern(format!("{}: {}", source, e)))
    }

    /// Determines if a pattern can use simple string matching
    fn is_simple_pattern(pattern: &str) -> bool {
        pattern.len() < SIMPLE_PATTERN_THRESHOLD
            && !pattern.contains(|c: char| c.is_ascii_punctuation() && c != '_' && c != '-')
    }

    pub fn ignore_case(&self) -> bool {
        !self.options.case_sensitive
    }

    pub fn pattern_source(&self, index: usize) -> &str {
        self.patterns.get(index).map_or("", |p| p.source.as_str())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Finds the first pattern that matches `line`.
    ///
    /// Occurrences ending at or before `skip_until` are ignored; they were
    /// reported from an earlier segment of the same line. Only the first
    /// occurrence is kept unless `all` is set.
    pub fn find(&self, line: &str, all: bool, skip_until: usize) -> Option<LineMatch> {
        self.patterns.iter().enumerate().find_map(|(index, pattern)| {
            let mut spans = Vec::new();
            let mut keep = |start: usize, end: usize| {
                if end > skip_until || skip_until == 0 {
                    spans.push((start, end - start));
                }
                all || spans.is_empty()
            };
            match &pattern.strategy {
                MatchStrategy::Simple(needle) => {
                    for (start, matched) in line.match_indices(needle.as_str()) {
                        if !keep(start, start + matched.len()) {
                            break;
                        }
                    }
                }
                MatchStrategy::Regex(regex) => {
                    for m in regex.find_iter(line) {
                        if !keep(m.start(), m.end()) {
                            break;
                        }
                    }
                }
            }
            (!spans.is_empty()).then_some(LineMatch {
                pattern: index,
                spans,
            })
        })
    }
}
