//! Entry filtering: exclude patterns, size and date bounds, and the
//! extension category allowlist.
//!
//! Checks run in a fixed order (exclude patterns, size, modified date,
//! category). A category match overrides an exclude-pattern hit, so
//! `--category Pictures --exclude *.png` still reports PNG files.
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::SystemTime;

use crate::errors::{FindError, FindResult};
use crate::wildcard::WildcardSet;

/// Directory exclusion applied when the caller supplies none
pub const DEFAULT_DIRECTORY_EXCLUDE: &str = "*/.git";

/// Closed set of extension groups usable as a file allowlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Pictures,
    Videos,
    Music,
    Documents,
    Spreadsheets,
    Presentations,
    Archives,
    Installers,
    Executables,
    Databases,
    DesignFiles,
    Ebooks,
    Subtitles,
    Fonts,
    EmailFiles,
    Models3D,
    SourceCode,
    Scripts,
    WebFiles,
    Configuration,
    Logs,
    TextFiles,
}

impl Category {
    pub const ALL: [Category; 22] = [
        Category::Pictures,
        Category::Videos,
        Category::Music,
        Category::Documents,
        Category::Spreadsheets,
        Category::Presentations,
        Category::Archives,
        Category::Installers,
        Category::Executables,
        Category::Databases,
        Category::DesignFiles,
        Category::Ebooks,
        Category::Subtitles,
        Category::Fonts,
        Category::EmailFiles,
        Category::Models3D,
        Category::SourceCode,
        Category::Scripts,
        Category::WebFiles,
        Category::Configuration,
        Category::Logs,
        Category::TextFiles,
    ];

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Category::Pictures => &[
                "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp", "heic", "ico", "raw",
                "svg",
            ],
            Category::Videos => &["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg"],
            Category::Music => &["mp3", "wav", "flac", "aac", "ogg", "wma", "m4a", "opus", "mid"],
            Category::Documents => &["doc", "docx", "pdf", "rtf", "odt", "tex", "pages"],
            Category::Spreadsheets => &["xls", "xlsx", "xlsm", "ods", "csv", "tsv", "numbers"],
            Category::Presentations => &["ppt", "pptx", "odp", "key"],
            Category::Archives => &["zip", "rar", "7z", "tar", "gz", "bz2", "xz", "zst", "tgz"],
            Category::Installers => &["msi", "msix", "appx", "deb", "rpm", "pkg", "dmg"],
            Category::Executables => &["exe", "dll", "so", "dylib", "bin", "com", "app"],
            Category::Databases => &["db", "sqlite", "sqlite3", "mdb", "accdb", "sql", "ldf", "mdf"],
            Category::DesignFiles => &["psd", "ai", "xd", "fig", "sketch", "indd", "eps"],
            Category::Ebooks => &["epub", "mobi", "azw", "azw3", "fb2", "djvu"],
            Category::Subtitles => &["srt", "vtt", "ass", "ssa", "sub"],
            Category::Fonts => &["ttf", "otf", "woff", "woff2", "fon"],
            Category::EmailFiles => &["eml", "msg", "pst", "ost", "mbox"],
            Category::Models3D => &["obj", "fbx", "stl", "blend", "3ds", "gltf", "glb", "dae"],
            Category::SourceCode => &[
                "rs", "c", "h", "cpp", "hpp", "cs", "java", "go", "py", "rb", "kt", "swift", "ts",
                "js", "fs", "scala",
            ],
            Category::Scripts => &["ps1", "psm1", "psd1", "sh", "bash", "zsh", "bat", "cmd", "lua"],
            Category::WebFiles => &["html", "htm", "css", "scss", "jsx", "tsx", "vue", "php"],
            Category::Configuration => &["json", "yaml", "yml", "toml", "ini", "cfg", "conf", "xml"],
            Category::Logs => &["log", "trace", "etl", "evtx"],
            Category::TextFiles => &["txt", "md", "markdown", "rst", "text", "nfo"],
        }
    }

    fn key(self) -> String {
        format!("{:?}", self).to_ascii_lowercase()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for Category {
    type Err = FindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_' && *c != ' ')
            .collect::<String>()
            .to_ascii_lowercase();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.key() == wanted)
            .ok_or_else(|| FindError::config_error(format!("Unknown category: {}", s)))
    }
}

/// Extension (lowercase, no dot) to the categories that contain it
static CATEGORY_BY_EXTENSION: Lazy<HashMap<&'static str, Vec<Category>>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, Vec<Category>> = HashMap::new();
    for category in Category::ALL {
        for ext in category.extensions() {
            map.entry(ext).or_default().push(category);
        }
    }
    map
});

/// Extensions whose alternate streams are never content-searched
static STREAM_SKIP_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "exe", "dll", "so", "dylib", "bin", "obj", "o", "class", "jar", "war", "ear", "png", "jpg",
        "jpeg", "gif", "bmp", "ico", "pdf", "doc", "docx", "xls", "xlsx", "zip", "tar", "gz", "7z",
        "rar",
    ]
    .into_iter()
    .collect()
});

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Returns the categories a file belongs to by extension
pub fn categories_of(path: &Path) -> &'static [Category] {
    lowercase_extension(path)
        .and_then(|ext| CATEGORY_BY_EXTENSION.get(ext.as_str()))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Checks if the streams of this file should be skipped for content search
pub fn skips_stream_search(path: &Path) -> bool {
    lowercase_extension(path)
        .map(|ext| STREAM_SKIP_EXTENSIONS.contains(ext.as_str()))
        .unwrap_or(false)
}

/// Why a file was filtered out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Excluded,
    TooSmall,
    TooLarge,
    ModifiedTooEarly,
    ModifiedTooLate,
    NotInCategory,
}

/// Filter settings compiled once per run
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    exclude_files: WildcardSet,
    exclude_dirs: WildcardSet,
    min_size: Option<u64>,
    max_size: Option<u64>,
    modified_after: Option<SystemTime>,
    modified_before: Option<SystemTime>,
    categories: Vec<Category>,
}

impl EntryFilter {
    pub fn builder() -> EntryFilterBuilder {
        EntryFilterBuilder::default()
    }

    pub fn has_categories(&self) -> bool {
        !self.categories.is_empty()
    }

    /// Directory exclusion; excluded directories are neither reported nor entered
    pub fn is_excluded_dir(&self, full_path: &str, name: &str) -> bool {
        self.exclude_dirs.matches_path(full_path, name)
    }

    pub fn check_file(
        &self,
        path: &Path,
        full_path: &str,
        name: &str,
        size: u64,
        modified: Option<SystemTime>,
    ) -> Result<(), Rejection> {
        let excluded = self.exclude_files.matches_path(full_path, name);

        if self.min_size.is_some_and(|min| size < min) {
            return Err(Rejection::TooSmall);
        }
        if self.max_size.is_some_and(|max| size > max) {
            return Err(Rejection::TooLarge);
        }

        if let Some(modified) = modified {
            if self.modified_after.is_some_and(|after| modified < after) {
                return Err(Rejection::ModifiedTooEarly);
            }
            if self.modified_before.is_some_and(|before| modified > before) {
                return Err(Rejection::ModifiedTooLate);
            }
        }

        if self.has_categories() {
            let in_category = categories_of(path)
                .iter()
                .any(|c| self.categories.contains(c));
            return if in_category {
                Ok(())
            } else {
                Err(Rejection::NotInCategory)
            };
        }

        if excluded {
            Err(Rejection::Excluded)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
pub struct EntryFilterBuilder {
    exclude_files: Vec<String>,
    exclude_dirs: Option<Vec<String>>,
    min_size: Option<u64>,
    max_size: Option<u64>,
    modified_after: Option<SystemTime>,
    modified_before: Option<SystemTime>,
    categories: Vec<Category>,
    case_sensitive: bool,
}

impl EntryFilterBuilder {
    pub fn exclude_files(mut self, patterns: &[String]) -> Self {
        self.exclude_files = patterns.to_vec();
        self
    }

    /// Replaces the default `.git` directory exclusion when non-empty
    pub fn exclude_dirs(mut self, patterns: &[String]) -> Self {
        if !patterns.is_empty() {
            self.exclude_dirs = Some(patterns.to_vec());
        }
        self
    }

    pub fn size_bounds(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_size = min;
        self.max_size = max;
        self
    }

    pub fn modified_bounds(mut self, after: Option<SystemTime>, before: Option<SystemTime>) -> Self {
        self.modified_after = after;
        self.modified_before = before;
        self
    }

    pub fn categories(mut self, categories: &[Category]) -> Self {
        self.categories = categories.to_vec();
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn build(self) -> FindResult<EntryFilter> {
        let dirs = self
            .exclude_dirs
            .unwrap_or_else(|| vec![DEFAULT_DIRECTORY_EXCLUDE.to_string()]);
        Ok(EntryFilter {
            exclude_files: WildcardSet::new(&self.exclude_files, self.case_sensitive)?,
            exclude_dirs: WildcardSet::new(&dirs, self.case_sensitive)?,
            min_size: self.min_size,
            max_size: self.max_size,
            modified_after: self.modified_after,
            modified_before: self.modified_before,
            categories: self.categories,
        })
    }
}
