//! JSON document backend.
//!
//! All keys live in one flat JSON object. Every mutation rewrites the whole
//! document through a sibling temp file that is synced and then renamed over
//! the original, so a crash leaves either the old or the new document.

use crate::{SecureStorage, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

type Document = BTreeMap<String, String>;

/// File-backed storage with atomic batch commits.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Use the document at `path`. The file and its directory are created on
    /// first write.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if path.file_name().is_none() {
            return Err(StorageError::Backend(format!(
                "Not a file path: {}",
                path.display()
            )));
        }

        debug!(path = %path.display(), "Opened file storage");
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> StorageResult<Document> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };
        if raw.trim().is_empty() {
            return Ok(Document::new());
        }

        serde_json::from_str(&raw).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Storage document is not valid JSON");
            StorageError::Encoding(e.to_string())
        })
    }

    /// Read, modify and commit the document while holding the write lock.
    fn update<T>(&self, f: impl FnOnce(&mut Document) -> T) -> StorageResult<T> {
        let _guard = self.write_lock.lock();
        let mut document = self.read_document()?;
        let result = f(&mut document);

        let content = serde_json::to_string_pretty(&document)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;
        atomic_write(&self.path, &content)?;
        Ok(result)
    }
}

impl SecureStorage for FileStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(key = %key, "Setting stored value");
        self.update(|doc| {
            doc.insert(key.to_string(), value.to_string());
        })
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.read_document()?.remove(key))
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        debug!(key = %key, "Deleting stored value");
        self.update(|doc| doc.remove(key).is_some())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> StorageResult<()> {
        debug!(count = entries.len(), "Setting stored values");
        self.update(|doc| {
            for (key, value) in entries {
                doc.insert((*key).to_string(), (*value).to_string());
            }
        })
    }

    fn delete_many(&self, keys: &[&str]) -> StorageResult<()> {
        debug!(count = keys.len(), "Deleting stored values");
        self.update(|doc| {
            for key in keys {
                doc.remove(*key);
            }
        })
    }
}

/// Create a new file readable only by its owner before any byte is written.
fn create_private(path: &Path) -> io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(
        ".{}.tmp.{}",
        file_name,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ));

    let write_result = (|| -> io::Result<()> {
        let mut file = create_private(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;

        fs::rename(&tmp_path, path)?;

        if let Ok(parent_dir) = fs::File::open(dir) {
            let _ = parent_dir.sync_all();
        }
        Ok(())
    })();

    if write_result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    write_result
}
