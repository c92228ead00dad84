use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::errors::{FindError, FindResult};
use crate::filters::Category;
use crate::scheduler::default_parallelism;
use crate::search::matcher::Culture;
use crate::walker::EntryMode;

/// Configuration for a find run.
///
/// # Configuration Locations
///
/// Values are layered from these files, later ones overriding earlier ones:
/// 1. Global `$CONFIG_DIR/rustfind/config.yaml`
/// 2. Local `.rustfind.yaml` in the current directory
/// 3. Custom config file specified via `--config`
///
/// Command line values are merged on top with [`FindConfig::merge_with_cli`].
///
/// # Configuration Format
///
/// ```yaml
/// # Name masks; `**` matches any number of directory levels
/// names: ["src/**/*.rs", "*.toml"]
///
/// # Search roots for relative masks (default: the base directory)
/// roots: ["/work"]
///
/// # Files, directories or files-and-directories
/// mode: files
///
/// exclude: ["*.min.js"]
/// exclude_directories: ["*/target", "*/.git"]
/// categories: [source-code, config]
///
/// max_file_size: 1048576
/// modified_after: "2024-01-01T00:00:00Z"
///
/// content:
///   patterns: ["TODO|FIXME"]
///   context_before: 2
///   context_after: 2
///   encoding: "utf-8"
///
/// timeout_secs: 30
/// thread_count: 8
/// log_level: "info"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FindConfig {
    /// Name or path masks; empty means `*`
    pub names: Vec<String>,

    pub content: ContentConfig,

    /// Only report files whose extension belongs to one of these categories
    pub categories: Vec<Category>,

    /// Roots relative masks are searched from
    pub roots: Vec<PathBuf>,

    /// Drive letters (`C` or `C:`) searched as additional roots
    pub drives: Vec<String>,

    /// Search every available drive
    pub all_drives: bool,

    pub mode: EntryMode,

    /// Also report alternate data streams of matching files
    pub include_alternate_streams: bool,

    /// Match names only in the starting directory
    pub no_recurse: bool,

    pub follow_symlinks: bool,

    /// Deepest level below each starting location that is walked
    pub max_recursion_depth: Option<usize>,

    pub min_file_size: Option<u64>,
    pub max_file_size: Option<u64>,

    #[serde(with = "rfc3339")]
    pub modified_after: Option<SystemTime>,
    #[serde(with = "rfc3339")]
    pub modified_before: Option<SystemTime>,

    /// File wildcard patterns to skip
    pub exclude: Vec<String>,

    /// Directory wildcard patterns to skip; replaces the default `*/.git`
    pub exclude_directories: Vec<String>,

    /// Parent levels probed for relative masks once the walk is done
    pub search_upward: usize,

    pub timeout_secs: Option<u64>,

    /// Baseline worker count per pool (default: physical cores)
    pub thread_count: Option<usize>,

    /// Emit file and directory descriptors instead of path strings
    pub pass_thru: bool,

    /// Directory paths are resolved and displayed against (default: cwd)
    pub base_dir: Option<PathBuf>,

    /// Force plain output even when attached to a terminal
    pub unattended: bool,

    /// Show a spinner on stderr while attended
    pub progress: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Override the platform default for path comparisons
    pub case_sensitive_paths: Option<bool>,

    /// Per content worker buffer budget in bytes
    pub memory_budget: Option<usize>,
}

/// Content search options, nested under `content:` in files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Regular expressions, tried in order; empty disables content search
    pub patterns: Vec<String>,
    pub all_matches: bool,
    pub case_sensitive: bool,
    pub context_before: usize,
    pub context_after: usize,
    pub culture: Culture,
    /// Encoding label used when a file has no byte order mark
    pub encoding: Option<String>,
    /// Report only the first record per file
    pub list: bool,
    /// Report matching files instead of records
    pub quiet: bool,
    /// Print only line text
    pub raw: bool,
    /// Treat patterns as literal text
    pub simple_match: bool,
    /// Report lines that do not match
    pub not_match: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for FindConfig {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            content: ContentConfig::default(),
            categories: Vec::new(),
            roots: Vec::new(),
            drives: Vec::new(),
            all_drives: false,
            mode: EntryMode::default(),
            include_alternate_streams: false,
            no_recurse: false,
            follow_symlinks: false,
            max_recursion_depth: None,
            min_file_size: None,
            max_file_size: None,
            modified_after: None,
            modified_before: None,
            exclude: Vec::new(),
            exclude_directories: Vec::new(),
            search_upward: 0,
            timeout_secs: None,
            thread_count: None,
            pass_thru: false,
            base_dir: None,
            unattended: false,
            progress: true,
            log_level: default_log_level(),
            case_sensitive_paths: None,
            memory_budget: None,
        }
    }
}

impl FindConfig {
    /// Loads configuration from the default locations
    pub fn load() -> FindResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus `config_path`,
    /// which must exist when given
    pub fn load_from(config_path: Option<&Path>) -> FindResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let defaults = [
            dirs::config_dir().map(|p| p.join("rustfind/config.yaml")),
            Some(PathBuf::from(".rustfind.yaml")),
        ];
        for path in defaults.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: FindConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Merges CLI arguments with configuration file values; any value the
    /// CLI set explicitly wins
    pub fn merge_with_cli(mut self, cli: FindConfig) -> Self {
        if !cli.names.is_empty() {
            self.names = cli.names;
        }
        self.content = self.content.merge_with_cli(cli.content);
        if !cli.categories.is_empty() {
            self.categories = cli.categories;
        }
        if !cli.roots.is_empty() {
            self.roots = cli.roots;
        }
        if !cli.drives.is_empty() {
            self.drives = cli.drives;
        }
        self.all_drives |= cli.all_drives;
        if cli.mode != EntryMode::default() {
            self.mode = cli.mode;
        }
        self.include_alternate_streams |= cli.include_alternate_streams;
        self.no_recurse |= cli.no_recurse;
        self.follow_symlinks |= cli.follow_symlinks;
        self.max_recursion_depth = cli.max_recursion_depth.or(self.max_recursion_depth);
        self.min_file_size = cli.min_file_size.or(self.min_file_size);
        self.max_file_size = cli.max_file_size.or(self.max_file_size);
        self.modified_after = cli.modified_after.or(self.modified_after);
        self.modified_before = cli.modified_before.or(self.modified_before);
        if !cli.exclude.is_empty() {
            self.exclude = cli.exclude;
        }
        if !cli.exclude_directories.is_empty() {
            self.exclude_directories = cli.exclude_directories;
        }
        if cli.search_upward > 0 {
            self.search_upward = cli.search_upward;
        }
        self.timeout_secs = cli.timeout_secs.or(self.timeout_secs);
        self.thread_count = cli.thread_count.or(self.thread_count);
        self.pass_thru |= cli.pass_thru;
        self.base_dir = cli.base_dir.or(self.base_dir);
        self.unattended |= cli.unattended;
        if !cli.progress {
            self.progress = false;
        }
        if cli.log_level != default_log_level() {
            self.log_level = cli.log_level;
        }
        self.case_sensitive_paths = cli.case_sensitive_paths.or(self.case_sensitive_paths);
        self.memory_budget = cli.memory_budget.or(self.memory_budget);
        self
    }

    /// Checks values serde cannot reject on its own
    pub fn validate(&self) -> FindResult<()> {
        if self.thread_count == Some(0) {
            return Err(FindError::config_error("thread_count must be at least 1"));
        }
        if let (Some(min), Some(max)) = (self.min_file_size, self.max_file_size) {
            if min > max {
                return Err(FindError::config_error(format!(
                    "min_file_size {} is larger than max_file_size {}",
                    min, max
                )));
            }
        }
        if let (Some(after), Some(before)) = (self.modified_after, self.modified_before) {
            if after > before {
                return Err(FindError::config_error(
                    "modified_after is later than modified_before",
                ));
            }
        }
        if self.memory_budget == Some(0) {
            return Err(FindError::config_error("memory_budget must be positive"));
        }
        Ok(())
    }

    /// Whether files are searched for content patterns
    pub fn has_content_search(&self) -> bool {
        !self.content.patterns.is_empty()
    }

    /// Baseline pool size
    pub fn baseline_threads(&self) -> usize {
        self.thread_count.unwrap_or_else(default_parallelism).max(1)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl ContentConfig {
    fn merge_with_cli(mut self, cli: ContentConfig) -> Self {
        if !cli.patterns.is_empty() {
            self.patterns = cli.patterns;
        }
        self.all_matches |= cli.all_matches;
        self.case_sensitive |= cli.case_sensitive;
        if cli.context_before > 0 {
            self.context_before = cli.context_before;
        }
        if cli.context_after > 0 {
            self.context_after = cli.context_after;
        }
        if cli.culture != Culture::default() {
            self.culture = cli.culture;
        }
        self.encoding = cli.encoding.or(self.encoding);
        self.list |= cli.list;
        self.quiet |= cli.quiet;
        self.raw |= cli.raw;
        self.simple_match |= cli.simple_match;
        self.not_match |= cli.not_match;
        self
    }
}

/// `Option<SystemTime>` as an RFC 3339 string
mod rfc3339 {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::SystemTime;

    pub fn serialize<S: Serializer>(time: &Option<SystemTime>, s: S) -> Result<S::Ok, S::Error> {
        match time {
            Some(t) => s.serialize_str(&humantime::format_rfc3339_seconds(*t).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SystemTime>, D::Error> {
        let text: Option<String> = Option::deserialize(d)?;
        text.map(|t| humantime::parse_rfc3339_weak(&t).map_err(de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_config_file() {
        let (_dir, path) = write_config(
            r#"
            names: ["*.rs", "*.toml"]
            mode: files-and-directories
            categories: [source-code]
            exclude_directories: ["*/target"]
            max_file_size: 4096
            modified_after: "2024-01-01T00:00:00Z"
            timeout_secs: 30
            thread_count: 4
            log_level: "debug"
            content:
              patterns: ["TODO|FIXME"]
              context_before: 2
              culture: invariant
              encoding: "windows-1252"
        "#,
        );

        let config = FindConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.names, vec!["*.rs", "*.toml"]);
        assert_eq!(config.mode, EntryMode::FilesAndDirectories);
        assert_eq!(config.categories, vec![Category::SourceCode]);
        assert_eq!(config.exclude_directories, vec!["*/target"]);
        assert_eq!(config.max_file_size, Some(4096));
        assert_eq!(
            config.modified_after,
            Some(humantime::parse_rfc3339("2024-01-01T00:00:00Z").unwrap())
        );
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.baseline_threads(), 4);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.content.patterns, vec!["TODO|FIXME"]);
        assert_eq!(config.content.context_before, 2);
        assert_eq!(config.content.culture, Culture::Invariant);
        assert_eq!(config.content.encoding.as_deref(), Some("windows-1252"));
        assert!(config.has_content_search());
    }

    #[test]
    fn test_default_values() {
        let (_dir, path) = write_config("names: [\"*.txt\"]\n");

        let config = FindConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.names, vec!["*.txt"]);
        assert_eq!(config.mode, EntryMode::Files);
        assert!(config.exclude_directories.is_empty());
        assert!(config.progress);
        assert!(!config.has_content_search());
        assert_eq!(config.thread_count, None);
        assert_eq!(config.baseline_threads(), default_parallelism());
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_merge_with_cli() {
        let file = FindConfig {
            names: vec!["*.rs".to_string()],
            exclude: vec!["*.tmp".to_string()],
            max_file_size: Some(10),
            thread_count: Some(4),
            content: ContentConfig {
                patterns: vec!["TODO".to_string()],
                context_after: 3,
                ..Default::default()
            },
            ..Default::default()
        };
        let cli = FindConfig {
            names: vec!["*.md".to_string()],
            thread_count: Some(8),
            progress: false,
            log_level: "debug".to_string(),
            content: ContentConfig {
                patterns: vec!["FIXME".to_string()],
                quiet: true,
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = file.merge_with_cli(cli);
        assert_eq!(merged.names, vec!["*.md"]);
        assert_eq!(merged.exclude, vec!["*.tmp"]);
        assert_eq!(merged.max_file_size, Some(10));
        assert_eq!(merged.thread_count, Some(8));
        assert!(!merged.progress);
        assert_eq!(merged.log_level, "debug");
        assert_eq!(merged.content.patterns, vec!["FIXME"]);
        assert_eq!(merged.content.context_after, 3);
        assert!(merged.content.quiet);
    }

    #[test]
    fn test_validation() {
        let config = FindConfig {
            min_file_size: Some(100),
            max_file_size: Some(10),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FindError::Config(_))));

        let config = FindConfig {
            thread_count: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(FindConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let (_dir, path) = write_config(
            r#"
            names: 123
            mode: sideways
            thread_count: "invalid"
        "#,
        );
        assert!(FindConfig::load_from(Some(&path)).is_err());

        let (_dir, path) = write_config("modified_after: \"last tuesday\"\n");
        assert!(FindConfig::load_from(Some(&path)).is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = FindConfig::load_from(Some(Path::new("nonexistent.yaml")));
        assert!(matches!(result, Err(FindError::Config(_))));
    }
}
