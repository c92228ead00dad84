use dashmap::DashSet;
use std::path::Path;

/// Whether location keys compare case-insensitively by default
pub fn default_case_sensitive() -> bool {
    !(cfg!(windows) || cfg!(target_os = "macos"))
}

/// Set of `(location, mask)` pairs already walked in this run.
///
/// Inserts are atomic; a failed insert means another worker already owns
/// the unit and the caller must skip it.
#[derive(Debug)]
pub struct VisitedSet {
    keys: DashSet<String>,
    case_sensitive: bool,
}

impl VisitedSet {
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            keys: DashSet::new(),
            case_sensitive,
        }
    }

    fn key(&self, location: &Path, mask: &str) -> String {
        let location = location.to_string_lossy().replace('\\', "/");
        let location = match location.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        let key = format!("{}|{}", location, mask);
        if self.case_sensitive {
            key
        } else {
            key.to_lowercase()
        }
    }

    /// Returns true when the pair was not yet present
    pub fn insert(&self, location: &Path, mask: &str) -> bool {
        self.keys.insert(self.key(location, mask))
    }

    pub fn contains(&self, location: &Path, mask: &str) -> bool {
        self.keys.contains(&self.key(location, mask))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new(default_case_sensitive())
    }
}
