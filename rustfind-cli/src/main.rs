use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use rustfind::{
    logging, output::is_unattended, Category, ContentConfig, Culture, EntryMode, FindConfig,
    FindOutput, FindSummary, Finder, MatchRecord,
};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Name or path masks to find (default: *)
    names: Vec<String>,

    /// Content pattern to search for (can be specified multiple times)
    #[arg(short = 'c', long = "content")]
    patterns: Vec<String>,

    /// Only report files of these categories (e.g. source-code,pictures)
    #[arg(long = "category", value_delimiter = ',')]
    categories: Vec<Category>,

    /// Baseline number of workers per pool
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Stop after this many seconds, keeping results found so far
    #[arg(long)]
    timeout: Option<u64>,

    /// Search every available drive
    #[arg(long)]
    all_drives: bool,

    /// Drive to search (can be specified multiple times)
    #[arg(long = "drive")]
    drives: Vec<String>,

    /// Root directory relative masks are searched from (can be specified multiple times)
    #[arg(long = "root")]
    roots: Vec<PathBuf>,

    /// Report directories instead of files
    #[arg(long, conflicts_with = "files_and_directories")]
    directories: bool,

    /// Report both files and directories
    #[arg(long)]
    files_and_directories: bool,

    /// Also report alternate data streams
    #[arg(long)]
    include_alternate_streams: bool,

    /// Only match names in the starting directory
    #[arg(long)]
    no_recurse: bool,

    /// Descend into symlinked directories
    #[arg(long)]
    follow_symlinks: bool,

    /// Maximum directory depth below each starting location
    #[arg(long)]
    max_depth: Option<usize>,

    /// Minimum file size in bytes
    #[arg(long)]
    min_size: Option<u64>,

    /// Maximum file size in bytes
    #[arg(long)]
    max_size: Option<u64>,

    /// Only files modified at or after this RFC 3339 time
    #[arg(long, value_parser = parse_time)]
    modified_after: Option<SystemTime>,

    /// Only files modified at or before this RFC 3339 time
    #[arg(long, value_parser = parse_time)]
    modified_before: Option<SystemTime>,

    /// File patterns to exclude
    #[arg(short = 'x', long)]
    exclude: Vec<String>,

    /// Directory patterns to exclude (replaces the default */.git)
    #[arg(long)]
    exclude_dir: Vec<String>,

    /// Parent levels to probe for relative masks
    #[arg(long, default_value = "0")]
    search_upward: usize,

    /// Report every occurrence on a line
    #[arg(long)]
    all_matches: bool,

    /// Match content case-sensitively
    #[arg(long)]
    case_sensitive: bool,

    /// Number of context lines before match
    #[arg(short = 'B', long, default_value = "0")]
    context_before: usize,

    /// Number of context lines after match
    #[arg(short = 'A', long, default_value = "0")]
    context_after: usize,

    /// Case folding rules (current|invariant)
    #[arg(long, value_parser = parse_culture)]
    culture: Option<Culture>,

    /// Encoding of files without a byte order mark (e.g. utf-16le, windows-1252)
    #[arg(long)]
    encoding: Option<String>,

    /// Report only the first match of each file
    #[arg(short = 'l', long)]
    list: bool,

    /// Report matching files instead of matches
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Print only the matching line text
    #[arg(long)]
    raw: bool,

    /// Treat content patterns as literal text
    #[arg(long)]
    simple_match: bool,

    /// Report lines that do not match
    #[arg(short = 'v', long)]
    not_match: bool,

    /// Print file and directory details instead of paths
    #[arg(long)]
    pass_thru: bool,

    /// Directory results are shown relative to (default: current directory)
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit one JSON object per result
    #[arg(long)]
    json: bool,

    /// Plain output without colors, links or progress
    #[arg(long)]
    unattended: bool,

    /// Hide the progress spinner
    #[arg(long)]
    no_progress: bool,

    /// Print run statistics when done
    #[arg(short, long)]
    stats: bool,
}

fn parse_time(text: &str) -> std::result::Result<SystemTime, String> {
    humantime::parse_rfc3339_weak(text).map_err(|e| e.to_string())
}

fn parse_culture(text: &str) -> std::result::Result<Culture, String> {
    match text.to_ascii_lowercase().as_str() {
        "current" => Ok(Culture::Current),
        "invariant" => Ok(Culture::Invariant),
        other => Err(format!("unknown culture '{}' (expected current or invariant)", other)),
    }
}

impl Cli {
    fn mode(&self) -> EntryMode {
        if self.files_and_directories {
            EntryMode::FilesAndDirectories
        } else if self.directories {
            EntryMode::Directories
        } else {
            EntryMode::Files
        }
    }

    fn to_config(&self) -> FindConfig {
        FindConfig {
            names: self.names.clone(),
            content: ContentConfig {
                patterns: self.patterns.clone(),
                all_matches: self.all_matches,
                case_sensitive: self.case_sensitive,
                context_before: self.context_before,
                context_after: self.context_after,
                culture: self.culture.unwrap_or_default(),
                encoding: self.encoding.clone(),
                list: self.list,
                quiet: self.quiet,
                raw: self.raw,
                simple_match: self.simple_match,
                not_match: self.not_match,
            },
            categories: self.categories.clone(),
            roots: self.roots.clone(),
            drives: self.drives.clone(),
            all_drives: self.all_drives,
            mode: self.mode(),
            include_alternate_streams: self.include_alternate_streams,
            no_recurse: self.no_recurse,
            follow_symlinks: self.follow_symlinks,
            max_recursion_depth: self.max_depth,
            min_file_size: self.min_size,
            max_file_size: self.max_size,
            modified_after: self.modified_after,
            modified_before: self.modified_before,
            exclude: self.exclude.clone(),
            exclude_directories: self.exclude_dir.clone(),
            search_upward: self.search_upward,
            timeout_secs: self.timeout,
            thread_count: self.threads,
            // JSON consumers get full descriptors
            pass_thru: self.pass_thru || self.json,
            base_dir: self.base_dir.clone(),
            unattended: self.unattended || self.json,
            progress: !self.no_progress,
            log_level: self.log_level.clone(),
            case_sensitive_paths: None,
            memory_budget: None,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = FindConfig::load_from(cli.config.as_deref())
        .context("Failed to load configuration")?
        .merge_with_cli(cli.to_config());
    logging::init(&config.log_level)?;
    debug!("Effective configuration: {:?}", config);

    if is_unattended(config.unattended) {
        colored::control::set_override(false);
    }
    let raw = config.content.raw;
    let finder = Finder::new(config)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut write_error = None;
    let summary = finder.run(|output| {
        if write_error.is_some() {
            return;
        }
        let written = if cli.json {
            output
                .to_json()
                .map_err(io::Error::from)
                .and_then(|line| writeln!(out, "{}", line))
        } else {
            print_output(&mut out, &output, raw)
        };
        if let Err(e) = written {
            // Typically a closed pipe; stop the run instead of printing into the void
            finder.cancellation_token().cancel();
            write_error = Some(e);
        }
    })?;

    if let Some(e) = write_error {
        if e.kind() != io::ErrorKind::BrokenPipe {
            return Err(e).context("Failed to write results");
        }
        return Ok(());
    }
    if cli.stats {
        print_stats(&mut out, &summary)?;
    }
    out.flush()?;
    Ok(())
}

fn print_output(out: &mut impl Write, output: &FindOutput, raw: bool) -> io::Result<()> {
    match output {
        FindOutput::PathString(path) => writeln!(out, "{}", path),
        FindOutput::File(file) => writeln!(
            out,
            "{}\t{}\t{}",
            file.display_path().blue(),
            file.size,
            format_time(file.modified)
        ),
        FindOutput::Directory(dir) => {
            writeln!(out, "{}/\t{}", dir.path.display().to_string().blue(), format_time(dir.modified))
        }
        FindOutput::Match(record) if raw => writeln!(out, "{}", record.line),
        FindOutput::Match(record) => print_match(out, record),
    }
}

fn print_match(out: &mut impl Write, record: &MatchRecord) -> io::Result<()> {
    let path = record.display_path();
    if let Some(context) = &record.context {
        for (number, line) in context.pre_lines.iter().zip(&context.pre) {
            writeln!(out, "{}-{}-{}", path.blue(), number.to_string().green(), line)?;
        }
    }
    writeln!(
        out,
        "{}:{}:{}",
        path.blue(),
        record.line_number.to_string().green(),
        highlight(record)
    )?;
    if let Some(context) = &record.context {
        for (number, line) in context.post_lines.iter().zip(&context.post) {
            writeln!(out, "{}-{}-{}", path.blue(), number.to_string().green(), line)?;
        }
    }
    Ok(())
}

/// The record's line with every recorded occurrence emphasized
fn highlight(record: &MatchRecord) -> String {
    if record.pattern.is_empty() {
        return record.line.clone();
    }
    let mut text = String::with_capacity(record.line.len());
    let mut cursor = 0;
    for (start, len) in record.line_spans() {
        let (Some(before), Some(hit)) = (
            record.line.get(cursor..start),
            record.line.get(start..start + len),
        ) else {
            continue;
        };
        text.push_str(before);
        text.push_str(&hit.red().bold().to_string());
        cursor = start + len;
    }
    text.push_str(record.line.get(cursor..).unwrap_or(""));
    text
}

fn format_time(time: Option<SystemTime>) -> String {
    time.map(|t| humantime::format_rfc3339_seconds(t).to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_stats(out: &mut impl Write, summary: &FindSummary) -> io::Result<()> {
    let stats = &summary.stats;
    writeln!(
        out,
        "\nFound {} results in {} directories ({} files searched, {} errors) in {}",
        stats.outputs_emitted,
        stats.directories_completed,
        stats.candidates_searched,
        stats.errors,
        humantime::format_duration(summary.elapsed)
    )?;
    if summary.cancelled {
        writeln!(out, "{}", "Search stopped early; results are partial".yellow())?;
    }
    Ok(())
}
