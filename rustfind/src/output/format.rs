use std::path::{Path, PathBuf};

use crate::mask::lexical_normalize;
use crate::results::FindOutput;

/// Turns file and directory descriptors into display strings and makes
/// match record paths relative
#[derive(Debug, Clone)]
pub struct Formatter {
    base_dir: PathBuf,
    pass_thru: bool,
    hyperlinks: bool,
}

impl Formatter {
    /// `pass_thru` keeps descriptors as they are; `hyperlinks` wraps each
    /// path in an OSC-8 link to its absolute location
    pub fn new(base_dir: impl Into<PathBuf>, pass_thru: bool, hyperlinks: bool) -> Self {
        Self {
            base_dir: lexical_normalize(&base_dir.into()),
            pass_thru,
            hyperlinks,
        }
    }

    pub fn format(&self, output: FindOutput) -> FindOutput {
        if self.pass_thru {
            return output;
        }
        match output {
            FindOutput::File(file) => {
                FindOutput::PathString(self.render(&file.path, file.stream.as_deref(), false))
            }
            FindOutput::Directory(dir) => FindOutput::PathString(self.render(&dir.path, None, true)),
            FindOutput::Match(mut record) => {
                record.path = PathBuf::from(self.relative(&record.path));
                FindOutput::Match(record)
            }
            other @ FindOutput::PathString(_) => other,
        }
    }

    fn render(&self, path: &Path, stream: Option<&str>, is_dir: bool) -> String {
        let mut text = self.relative(path);
        if is_dir && !text.ends_with('/') {
            text.push('/');
        }
        if let Some(stream) = stream {
            text.push(':');
            text.push_str(stream);
        }
        if self.hyperlinks {
            hyperlink(path, &text)
        } else {
            text
        }
    }

    /// `path` relative to the base directory with `/` separators; paths
    /// outside the base stay absolute
    pub fn relative(&self, path: &Path) -> String {
        let relative = match path.strip_prefix(&self.base_dir) {
            Ok(rest) if rest.as_os_str().is_empty() => ".".to_string(),
            Ok(rest) => rest.to_string_lossy().into_owned(),
            Err(_) => path.to_string_lossy().into_owned(),
        };
        relative.replace('\\', "/")
    }
}

/// Wraps `text` in an OSC-8 terminal hyperlink to `path`
pub fn hyperlink(path: &Path, text: &str) -> String {
    let target = path.to_string_lossy().replace('\\', "/");
    let target = if target.starts_with('/') {
        target
    } else {
        format!("/{}", target)
    };
    format!("\x1b]8;;file://{}\x1b\\{}\x1b]8;;\x1b\\", target, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{DirEntry, FileEntry, MatchRecord};

    fn file(path: &str, stream: Option<&str>) -> FindOutput {
        FindOutput::File(FileEntry {
            path: PathBuf::from(path),
            stream: stream.map(String::from),
            size: 1,
            modified: None,
        })
    }

    #[test]
    fn test_paths_are_relative_to_base() {
        let formatter = Formatter::new("/work", false, false);
        assert_eq!(
            formatter.format(file("/work/a/b.txt", None)),
            FindOutput::PathString("a/b.txt".to_string())
        );
        assert_eq!(
            formatter.format(file("/elsewhere/c.txt", None)),
            FindOutput::PathString("/elsewhere/c.txt".to_string())
        );
        assert_eq!(
            formatter.format(file("/work/a/b.txt", Some("meta"))),
            FindOutput::PathString("a/b.txt:meta".to_string())
        );
    }

    #[test]
    fn test_match_paths_are_relative() {
        let record = MatchRecord {
            path: PathBuf::from("/work/a/b.txt"),
            stream: Some("meta".to_string()),
            line_number: 2,
            line: "needle".to_string(),
            line_offset: 0,
            pattern: "needle".to_string(),
            offsets: vec![0],
            lengths: vec![6],
            context: None,
            ignore_case: true,
        };

        let FindOutput::Match(shown) = Formatter::new("/work", false, true).format(FindOutput::Match(record.clone()))
        else {
            panic!("expected a match");
        };
        assert_eq!(shown.path, PathBuf::from("a/b.txt"));
        assert_eq!(shown.display_path(), "a/b.txt:meta");
        assert_eq!(shown.line, record.line);

        let kept = Formatter::new("/work", true, false).format(FindOutput::Match(record.clone()));
        assert_eq!(kept, FindOutput::Match(record));
    }

    #[test]
    fn test_directories_get_trailing_slash() {
        let formatter = Formatter::new("/work", false, false);
        let dir = FindOutput::Directory(DirEntry {
            path: PathBuf::from("/work/src"),
            modified: None,
        });
        assert_eq!(formatter.format(dir), FindOutput::PathString("src/".to_string()));
    }

    #[test]
    fn test_pass_thru_keeps_descriptors() {
        let formatter = Formatter::new("/work", true, true);
        let item = file("/work/a.txt", None);
        assert_eq!(formatter.format(item.clone()), item);
    }

    #[test]
    fn test_hyperlinks() {
        let formatter = Formatter::new("/work", false, true);
        let FindOutput::PathString(text) = formatter.format(file("/work/a.txt", None)) else {
            panic!("expected a path string");
        };
        assert!(text.starts_with("\x1b]8;;file:///work/a.txt\x1b\\"));
        assert!(text.contains("a.txt\x1b]8;;"));
    }
}
