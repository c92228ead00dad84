//! Path mask resolution.
//!
//! A mask such as `src/**/*.rs`, `~/notes/*.md` or `\\server\logs*\*.log` is
//! split into a fixed [`ResolvedMask::location`] that can be walked directly
//! and a wildcard-bearing remainder that the walker consumes one segment per
//! directory level.
//!
//! All masks are normalized to `/` separators. A segment made only of two or
//! more `*` is a recursive marker and is rewritten to the canonical `**`, so
//! every remainder that recurses starts with [`RECURSIVE_PREFIX`].
use std::path::{Component, Path, PathBuf};

use crate::wildcard::has_wildcards;

/// Canonical prefix of a remainder that recurses through zero or more levels
pub const RECURSIVE_PREFIX: &str = "**/";

const RECURSIVE_MARKER: &str = "**";

/// True for segments matching `^\*\*\**$`
pub fn is_recursive_marker(segment: &str) -> bool {
    segment.len() >= 2 && segment.bytes().all(|b| b == b'*')
}

/// Classification of a normalized mask
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKind {
    /// `//machine/share/...`; `share` may hold wildcards or be empty
    Unc { machine: String, share: String },
    /// Starts at a filesystem or drive root
    Rooted,
    /// Resolved against the base directory or an explicit search root
    Relative,
}

/// Options that change how a mask is decomposed
#[derive(Debug, Clone)]
pub struct MaskOptions {
    /// Insert a recursive marker before the name segment when none is given
    pub recurse: bool,
    /// Treat `name:stream` in the final segment as an alternate stream suffix
    pub parse_streams: bool,
    /// Directory relative masks are resolved against
    pub base_dir: PathBuf,
}

impl Default for MaskOptions {
    fn default() -> Self {
        Self {
            recurse: true,
            parse_streams: cfg!(windows),
            base_dir: PathBuf::from("."),
        }
    }
}

/// A mask split into a walkable location and its wildcard remainder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMask {
    pub kind: PathKind,
    pub location: PathBuf,
    /// `/`-separated remainder, never empty
    pub mask: String,
    /// Alternate stream requested through a `name:stream` suffix
    pub stream: Option<String>,
    /// The first mask segment is a share wildcard to list on `location`
    pub share_listing: bool,
    /// No fixed segment was taken from a relative mask
    pub floating: bool,
}

impl ResolvedMask {
    /// The mask with its recursive markers removed, used for the
    /// non-recursive probes of an upward search
    pub fn leaf_mask(&self) -> String {
        self.mask
            .split('/')
            .filter(|segment| *segment != RECURSIVE_MARKER)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Whether an upward search may start from this mask
    pub fn supports_upward(&self) -> bool {
        self.kind == PathKind::Relative && self.floating
    }
}

/// One step of consuming a remainder at a single directory level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskStep<'a> {
    /// Last segment: matched against the entries of this directory
    Leaf(&'a str),
    /// Subdirectories matching `segment` continue with `tail`
    Descend { segment: &'a str, tail: &'a str },
    /// Apply `suffix` here and repeat the whole mask in every subdirectory
    Recursive { suffix: &'a str },
}

/// Splits off the segment the current directory level must satisfy
pub fn step(mask: &str) -> MaskStep<'_> {
    if mask == RECURSIVE_MARKER {
        return MaskStep::Recursive { suffix: "*" };
    }
    if let Some(mut suffix) = mask.strip_prefix(RECURSIVE_PREFIX) {
        while let Some(rest) = suffix.strip_prefix(RECURSIVE_PREFIX) {
            suffix = rest;
        }
        if suffix.is_empty() || suffix == RECURSIVE_MARKER {
            suffix = "*";
        }
        return MaskStep::Recursive { suffix };
    }
    match mask.split_once('/') {
        Some((segment, tail)) if !tail.is_empty() => MaskStep::Descend { segment, tail },
        Some((segment, _)) => MaskStep::Leaf(segment),
        None => MaskStep::Leaf(mask),
    }
}

/// Normalizes separators, strips long-path prefixes, expands `~` and
/// collapses repeated separators while keeping a leading UNC `//`.
pub fn normalize(raw: &str) -> String {
    let mut text = raw.trim().replace('\\', "/");

    if let Some(rest) = text.strip_prefix("//?/UNC/") {
        text = format!("//{}", rest);
    } else if let Some(rest) = text
        .strip_prefix("//?/")
        .or_else(|| text.strip_prefix("//./"))
    {
        text = rest.to_string();
    }

    if text == "~" || text.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            let home = home.to_string_lossy().replace('\\', "/");
            text = format!("{}{}", home.trim_end_matches('/'), &text[1..]);
        }
    }

    let unc = text.starts_with("//");
    let mut out = String::with_capacity(text.len());
    let mut prev_slash = false;
    for c in text.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    if unc {
        out.insert(0, '/');
    }
    out
}

/// Resolves lexical `.` and `..` components without touching the disk
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

struct RootSplit<'a> {
    kind: PathKind,
    root: Option<String>,
    rest: &'a str,
    share_listing: bool,
}

fn split_root(text: &str) -> RootSplit<'_> {
    if let Some(unc) = text.strip_prefix("//") {
        let (machine, after_machine) = unc.split_once('/').unwrap_or((unc, ""));
        let (share, rest) = after_machine.split_once('/').unwrap_or((after_machine, ""));
        let kind = PathKind::Unc {
            machine: machine.to_string(),
            share: share.to_string(),
        };
        if share.is_empty() || has_wildcards(share) {
            let rest = if share.is_empty() { "*" } else { after_machine };
            return RootSplit {
                kind,
                root: Some(format!("//{}", machine)),
                rest,
                share_listing: true,
            };
        }
        return RootSplit {
            kind,
            root: Some(format!("//{}/{}", machine, share)),
            rest,
            share_listing: false,
        };
    }

    let bytes = text.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let drive = &text[..2];
        let rest = text[2..].trim_start_matches('/');
        return RootSplit {
            kind: PathKind::Rooted,
            root: Some(format!("{}/", drive.to_ascii_uppercase())),
            rest,
            share_listing: false,
        };
    }

    if let Some(rest) = text.strip_prefix('/') {
        return RootSplit {
            kind: PathKind::Rooted,
            root: Some("/".to_string()),
            rest,
            share_listing: false,
        };
    }

    RootSplit {
        kind: PathKind::Relative,
        root: None,
        rest: text,
        share_listing: false,
    }
}

/// Decomposes one raw mask
pub fn resolve(raw: &str, options: &MaskOptions) -> ResolvedMask {
    let normalized = normalize(raw);
    let text = if normalized.is_empty() {
        "*".to_string()
    } else {
        normalized
    };
    let split = split_root(&text);

    let mut segments: Vec<&str> = split
        .rest
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if segments.is_empty() || split.rest.ends_with('/') {
        segments.push("*");
    }

    let mut location = match &split.root {
        Some(root) => PathBuf::from(root),
        None => options.base_dir.clone(),
    };

    let mut fixed = 0;
    if !split.share_listing {
        while fixed + 1 < segments.len()
            && !has_wildcards(segments[fixed])
            && !is_recursive_marker(segments[fixed])
        {
            location.push(segments[fixed]);
            fixed += 1;
        }
    }
    if !matches!(split.kind, PathKind::Unc { .. }) {
        location = lexical_normalize(&location);
    }

    let mut remaining: Vec<String> = Vec::with_capacity(segments.len() + 1);
    for segment in &segments[fixed..] {
        if is_recursive_marker(segment) {
            if remaining.last().map(String::as_str) != Some(RECURSIVE_MARKER) {
                remaining.push(RECURSIVE_MARKER.to_string());
            }
        } else {
            remaining.push((*segment).to_string());
        }
    }
    if remaining.last().map(String::as_str) == Some(RECURSIVE_MARKER) {
        remaining.push("*".to_string());
    }

    let mut stream = None;
    if options.parse_streams {
        if let Some(last) = remaining.last_mut() {
            if let Some((name, stream_name)) = last.split_once(':') {
                if !stream_name.is_empty() {
                    stream = Some(stream_name.to_string());
                    *last = if name.is_empty() {
                        "*".to_string()
                    } else {
                        name.to_string()
                    };
                }
            }
        }
    }

    // The share segment of a share listing is never recursed into implicitly.
    let first_recursable = usize::from(split.share_listing);
    if options.recurse
        && remaining.len() > first_recursable
        && !remaining.iter().any(|s| s == RECURSIVE_MARKER)
    {
        let at = remaining.len() - 1;
        remaining.insert(at, RECURSIVE_MARKER.to_string());
    }

    ResolvedMask {
        floating: split.kind == PathKind::Relative && fixed == 0,
        kind: split.kind,
        location,
        mask: remaining.join("/"),
        stream,
        share_listing: split.share_listing,
    }
}

/// Resolves masks against one or more explicit search roots.
///
/// Rooted and UNC masks ignore the roots. Relative masks produce one
/// resolution per root; duplicates are left for the visited set to drop.
#[derive(Debug, Clone)]
pub struct Resolver {
    options: MaskOptions,
    roots: Vec<PathBuf>,
}

impl Resolver {
    pub fn new(options: MaskOptions, roots: Vec<PathBuf>) -> Self {
        Self { options, roots }
    }

    pub fn resolve(&self, raw: &str) -> Vec<ResolvedMask> {
        let first = resolve(raw, &self.options);
        if first.kind != PathKind::Relative || self.roots.is_empty() {
            return vec![first];
        }
        self.roots
            .iter()
            .map(|root| {
                let options = MaskOptions {
                    base_dir: root.clone(),
                    ..self.options.clone()
                };
                resolve(raw, &options)
            })
            .collect()
    }

    pub fn resolve_all<S: AsRef<str>>(&self, masks: &[S]) -> Vec<ResolvedMask> {
        masks.iter().flat_map(|m| self.resolve(m.as_ref())).collect()
    }
}
