//! Parallel recursive file finder with streaming content matching.
//!
//! ```rust,no_run
//! use rustfind::{FindConfig, Finder};
//!
//! let config = FindConfig {
//!     names: vec!["*.rs".to_string()],
//!     ..Default::default()
//! };
//! let finder = Finder::new(config)?;
//! let summary = finder.run(|output| println!("{:?}", output))?;
//! println!("{} results", summary.stats.outputs_emitted);
//! # Ok::<(), rustfind::FindError>(())
//! ```
pub mod cancel;
pub mod config;
pub mod engine;
pub mod errors;
pub mod filters;
pub mod logging;
pub mod mask;
pub mod metrics;
pub mod output;
pub mod platform;
pub mod results;
pub mod scheduler;
pub mod search;
pub mod walker;
pub mod wildcard;

pub use cancel::CancellationToken;
pub use config::{ContentConfig, FindConfig};
pub use engine::Finder;
pub use errors::{FindError, FindResult};
pub use filters::Category;
pub use metrics::{RunMetrics, RunStats};
pub use platform::{NativePlatform, Platform, StreamInfo};
pub use results::{DirEntry, FileEntry, FindOutput, FindSummary, MatchContext, MatchRecord};
pub use search::Culture;
pub use walker::EntryMode;
