//! Configuration management for the dashboard client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default identity service base URL (can be overridden at compile time via CONSOLE_IDENTITY_URL).
pub const DEFAULT_IDENTITY_URL: &str = match option_env!("CONSOLE_IDENTITY_URL") {
    Some(url) => url,
    None => "http://localhost:8000/api/auth",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Timing and retry knobs for the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthTuning {
    /// Delay before `initialize()` reads storage, letting an early login win.
    pub init_delay_ms: u64,
    /// Tolerance applied to the `exp` claim before a token counts as expired.
    pub clock_skew_secs: i64,
    /// Attempts made against `GET /me` before verification gives up.
    pub verify_max_attempts: u32,
    /// Backoff after the first failed attempt; doubles per attempt.
    pub verify_initial_delay_ms: u64,
    /// Backoff ceiling.
    pub verify_max_delay_ms: u64,
    /// Deadline for a single verification attempt.
    pub verify_attempt_timeout_ms: u64,
}

impl Default for AuthTuning {
    fn default() -> Self {
        Self {
            init_delay_ms: 50,
            clock_skew_secs: 5,
            verify_max_attempts: 3,
            verify_initial_delay_ms: 120,
            verify_max_delay_ms: 1_000,
            verify_attempt_timeout_ms: 5_000,
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Base URL of the identity service (`/login`, `/me`, `/logout` hang off it).
    #[serde(default = "default_identity_url")]
    pub identity_url: String,
    #[serde(default)]
    pub auth: AuthTuning,
}

fn default_identity_url() -> String {
    DEFAULT_IDENTITY_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            auth: AuthTuning::default(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.identity_url()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|source| CoreError::InvalidConfigFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("CONSOLE_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(url) = std::env::var("CONSOLE_IDENTITY_URL") {
            if !url.trim().is_empty() {
                self.identity_url = url.trim().to_string();
            }
        }
    }

    /// Get the identity service URL as a parsed URL.
    pub fn identity_url(&self) -> CoreResult<Url> {
        let url = Url::parse(&self.identity_url)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(CoreError::UnsupportedScheme(other.to_string())),
        }
    }
}
