use tracing_subscriber::EnvFilter;

use crate::errors::{FindError, FindResult};

/// Builds the filter for `level`; `RUST_LOG` takes precedence when set
pub fn filter_for(level: &str) -> FindResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| FindError::config_error(format!("Invalid log level '{}': {}", level, e)))
}

/// Installs a stderr subscriber. Later calls are ignored so tests and
/// embedding applications can call it freely.
pub fn init(level: &str) -> FindResult<()> {
    let filter = filter_for(level)?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert!(filter_for("debug").is_ok());
        assert!(filter_for("rustfind=trace,warn").is_ok());
        assert!(init("warn").is_ok());
        assert!(init("info").is_ok());
    }
}
