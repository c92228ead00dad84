//! Upward search: probing the parents of a relative mask's location, one
//! level per round, once the regular walk has drained.
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

use super::{SearchUnit, UnitKind};
use crate::mask::ResolvedMask;

#[derive(Debug)]
struct Cursor {
    current: PathBuf,
    remaining: usize,
    mask: String,
    stream: Option<String>,
}

/// Per-mask parent cursors, advanced together
#[derive(Debug, Default)]
pub struct UpwardSearch {
    cursors: Mutex<Vec<Cursor>>,
}

impl UpwardSearch {
    pub fn new(masks: &[ResolvedMask], levels: usize) -> Self {
        let cursors = if levels == 0 {
            Vec::new()
        } else {
            masks
                .iter()
                .filter(|m| m.supports_upward())
                .map(|m| Cursor {
                    current: m.location.clone(),
                    remaining: levels,
                    mask: m.leaf_mask(),
                    stream: m.stream.clone(),
                })
                .collect()
        };
        Self {
            cursors: Mutex::new(cursors),
        }
    }

    /// Moves every cursor one parent up and returns the probe units. Empty
    /// once every cursor hit its limit or a root.
    pub fn next_level(&self) -> Vec<SearchUnit> {
        let Ok(mut cursors) = self.cursors.lock() else {
            return Vec::new();
        };
        let mut units = Vec::with_capacity(cursors.len());
        cursors.retain_mut(|cursor| {
            if cursor.remaining == 0 {
                return false;
            }
            let Some(parent) = cursor.current.parent().map(PathBuf::from) else {
                return false;
            };
            if parent.as_os_str().is_empty() {
                return false;
            }
            debug!("Upward search probing {}", parent.display());
            cursor.remaining -= 1;
            cursor.current = parent.clone();
            units.push(SearchUnit {
                location: parent,
                mask: cursor.mask.clone(),
                depth: 0,
                kind: UnitKind::Directory,
                stream: cursor.stream.clone(),
            });
            true
        });
        units
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursors.lock().map(|c| c.is_empty()).unwrap_or(true)
    }
}
