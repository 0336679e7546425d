//! File system paths for the dashboard client.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Session store filename under the base directory.
const SESSION_STORE_NAME: &str = "session.json";

/// Resolves where the client keeps its files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.console)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.console`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir().ok_or(CoreError::HomeDirUnavailable)?;

        Ok(Self {
            base_dir: home.join(".console"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.console).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.console/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the durable session store path (~/.console/session.json).
    pub fn session_store_file(&self) -> PathBuf {
        self.base_dir.join(SESSION_STORE_NAME)
    }

    /// Get the logs directory (~/.console/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the central JSONL log path (~/.console/logs/dev.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("dev.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_are_rooted_in_base_dir() {
        let paths = Paths::with_base_dir(PathBuf::from("/tmp/console-test"));
        assert_eq!(
            paths.config_file(),
            PathBuf::from("/tmp/console-test/config.json")
        );
        assert_eq!(
            paths.session_store_file(),
            PathBuf::from("/tmp/console-test/session.json")
        );
        assert_eq!(
            paths.log_file(),
            PathBuf::from("/tmp/console-test/logs/dev.jsonl")
        );
    }

    #[test]
    fn test_ensure_dirs_creates_layout() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("nested"));

        paths.ensure_dirs().unwrap();
        assert!(paths.base_dir().is_dir());
        assert!(paths.logs_dir().is_dir());
    }
}
