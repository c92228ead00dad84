//! Wildcard matching for names and exclude patterns.
//!
//! Only `*` and `?` are wildcards. Bracket characters are escaped before the
//! text reaches `glob`, so a file literally named `report[1].txt` still
//! matches itself.
use glob::{MatchOptions, Pattern};

use crate::errors::{FindError, FindResult};

/// Returns true when `text` contains a `*` or `?`
pub fn has_wildcards(text: &str) -> bool {
    text.contains(['*', '?'])
}

/// A compiled `*`/`?` pattern
#[derive(Debug, Clone)]
pub struct Wildcard {
    source: String,
    pattern: Pattern,
    options: MatchOptions,
}

impl Wildcard {
    pub fn new(text: &str, case_sensitive: bool) -> FindResult<Self> {
        let pattern = Pattern::new(&to_glob(text))
            .map_err(|e| FindError::invalid_pattern(format!("{}: {}", text, e)))?;
        Ok(Self {
            source: text.to_string(),
            pattern,
            options: MatchOptions {
                case_sensitive,
                require_literal_separator: false,
                require_literal_leading_dot: false,
            },
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.matches_with(text, self.options)
    }

    /// True if the pattern is `*` and matches every name
    pub fn is_match_all(&self) -> bool {
        !self.source.is_empty() && self.source.chars().all(|c| c == '*')
    }
}

/// An ordered list of wildcards, matching when any member matches
#[derive(Debug, Clone, Default)]
pub struct WildcardSet {
    patterns: Vec<Wildcard>,
}

impl WildcardSet {
    pub fn new<S: AsRef<str>>(patterns: &[S], case_sensitive: bool) -> FindResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .map(|p| Wildcard::new(&p.replace('\\', "/"), case_sensitive))
            .collect::<FindResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(text))
    }

    /// Matches against the full `/`-separated path and the bare name
    pub fn matches_path(&self, full_path: &str, name: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches(full_path) || p.matches(name))
    }
}

/// Converts a `*`/`?` wildcard into glob syntax. Runs of `*` collapse to a
/// single `*` because separators are not literal in our match options, and
/// `glob` rejects `**` that is not a whole path component.
fn to_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut prev_star = false;
    for c in text.chars() {
        match c {
            '*' => {
                if !prev_star {
                    out.push('*');
                }
                prev_star = true;
                continue;
            }
            '[' => out.push_str("[[]"),
            ']' => out.push_str("[]]"),
            _ => out.push(c),
        }
        prev_star = false;
    }
    out
}
