//! Content search: streaming decode, pattern matching and context lines.
//!
//! Each file is read in bounded chunks through a [`reader::LineReader`],
//! matched line by line with a [`PatternMatcher`] and wrapped in context by a
//! [`context::ContextTracker`]. Scratch buffers come from a
//! [`pool::ScratchPool`] so a worker allocates only while its buffers grow.
//!
//! ```rust,ignore
//! let matcher = PatternMatcher::new(&["TODO".to_string()], MatchOptions::default())?;
//! let searcher = ContentSearcher::new(Arc::new(matcher), settings, platform, cancel);
//! let outcome = searcher.search(&candidate)?;
//! ```
pub mod context;
pub mod matcher;
pub mod pool;
pub mod processor;
pub mod reader;
pub(crate) mod worker;

pub use context::ContextTracker;
pub use matcher::{Culture, MatchOptions, PatternMatcher};
pub use processor::{ContentSearcher, FileOutcome, SearchSettings};
