//! # Observability
//!
//! Structured logging shared by every Console crate.
//!
//! Library crates only emit `tracing` events. The host process installs the
//! subscriber once, via [`init`] or [`init_with_config`], and decides where
//! events end up: a JSONL file (`~/.console/logs/dev.jsonl` by default) and,
//! optionally, compact lines on stderr. Credential-like fields are redacted
//! before anything is written.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "dashboard".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!("ready");
//! ```

mod json_layer;
mod sink;

use std::path::PathBuf;

pub use json_layer::{redact_value, LogEntry};
pub use sink::LogFile;

/// Where and how much to log.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Written into every entry as `service`.
    pub service_name: String,
    /// Filter used when `RUST_LOG` is unset.
    pub default_level: String,
    /// Overrides `~/.console/logs/dev.jsonl`.
    pub log_path: Option<PathBuf>,
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Install logging for `service_name` with default settings.
pub fn init(service_name: &str) -> bool {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Install logging as described by `config`.
///
/// Only the first call in a process takes effect; later calls return `false`.
/// When the log file cannot be opened, events go to stderr instead.
pub fn init_with_config(config: LogConfig) -> bool {
    sink::install(&config)
}

pub use tracing::{debug, error, info, instrument, trace, warn, Level};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }

    #[test]
    fn test_second_install_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            service_name: "observability-test".into(),
            log_path: Some(dir.path().join("test.jsonl")),
            ..Default::default()
        };

        init_with_config(config.clone());
        assert!(!init_with_config(config));
    }
}
