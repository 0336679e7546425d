//! Errors raised while resolving configuration and paths.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// The config file exists but is not a valid `Config` document.
    #[error("Invalid config file {}: {source}", path.display())]
    InvalidConfigFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Identity URL must be http or https, got scheme {0}")]
    UnsupportedScheme(String),

    #[error("Invalid identity URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Could not determine home directory")]
    HomeDirUnavailable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
