//! Durable storage backends for the dashboard session.
//!
//! - **File**: a JSON document on disk, each mutation committed with
//!   write-to-temp + fsync + rename so readers only ever see a whole batch.
//! - **Memory**: process-local map, for tests and ephemeral embedding.

mod file;
mod keys;
mod memory;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::SecureStorage;

use console_config_and_utils::Paths;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default durable storage at `~/.console/session.json`.
pub fn create_storage(paths: &Paths) -> StorageResult<Box<dyn SecureStorage>> {
    let storage = FileStorage::open(paths.session_store_file())?;
    Ok(Box::new(storage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_storage_keys_constants() {
        assert_eq!(StorageKeys::AUTH_TOKEN, "auth_token");
        assert_eq!(StorageKeys::AUTH_USER, "auth_user");
        assert_eq!(StorageKeys::AUTH_LAST_VERIFIED, "auth_last_verified");

        let unique: HashSet<_> = StorageKeys::SESSION_KEYS.iter().collect();
        assert_eq!(unique.len(), StorageKeys::SESSION_KEYS.len());
    }

    #[test]
    fn test_create_storage_under_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("console"));

        let storage = create_storage(&paths).unwrap();
        storage.set(StorageKeys::AUTH_TOKEN, "tok").unwrap();

        assert!(paths.session_store_file().exists());
    }
}
