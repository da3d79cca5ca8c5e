//! Logging setup
//!
//! The subscriber is installed before configuration loads so config warnings
//! are visible. `RUST_LOG` fixes the filter; otherwise it starts at the
//! compiled default and is replaced by `logging.level` once the config is read.

use stemscribe_common::config::CompiledDefaults;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Handle to the installed filter
pub struct LogFilter {
    handle: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

impl LogFilter {
    fn new(handle: reload::Handle<EnvFilter, Registry>, from_env: bool) -> Self {
        Self { handle, from_env }
    }

    /// Apply the configured level unless `RUST_LOG` was set
    ///
    /// Returns whether the filter changed. An unparseable level is logged and
    /// the current filter kept.
    pub fn apply_config_level(&self, level: &str) -> bool {
        if self.from_env {
            return false;
        }
        let filter = match EnvFilter::try_new(level) {
            Ok(filter) => filter,
            Err(e) => {
                tracing::warn!(level, error = %e, "Ignoring invalid logging.level");
                return false;
            }
        };
        match self.handle.reload(filter) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to apply logging.level");
                false
            }
        }
    }

    /// Current filter directives
    pub fn current(&self) -> Option<String> {
        self.handle.with_current(|filter| filter.to_string()).ok()
    }
}

/// Filter layer from `RUST_LOG`, else the compiled default level
fn initial_filter() -> (reload::Layer<EnvFilter, Registry>, LogFilter) {
    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(CompiledDefaults::for_current_platform().log_level), false),
    };
    let (layer, handle) = reload::Layer::new(filter);
    (layer, LogFilter::new(handle, from_env))
}

/// Install the global stderr subscriber
pub fn init() -> LogFilter {
    let (filter, handle) = initial_filter();
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
    handle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(initial: &str, from_env: bool) -> (reload::Layer<EnvFilter, Registry>, LogFilter) {
        let (layer, handle) = reload::Layer::new(EnvFilter::new(initial));
        (layer, LogFilter::new(handle, from_env))
    }

    #[test]
    fn test_config_level_replaces_default() {
        let (_layer, log_filter) = filter("info", false);
        assert!(log_filter.apply_config_level("stemscribe_worker=debug"));
        assert_eq!(log_filter.current().as_deref(), Some("stemscribe_worker=debug"));
    }

    #[test]
    fn test_rust_log_wins_over_config_level() {
        let (_layer, log_filter) = filter("warn", true);
        assert!(!log_filter.apply_config_level("debug"));
        assert_eq!(log_filter.current().as_deref(), Some("warn"));
    }

    #[test]
    fn test_invalid_config_level_keeps_filter() {
        let (_layer, log_filter) = filter("info", false);
        assert!(!log_filter.apply_config_level("stemscribe_worker=loud"));
        assert_eq!(log_filter.current().as_deref(), Some("info"));
    }
}
