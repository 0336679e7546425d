//! Central JSONL sink and subscriber installation.
//!
//! Several processes may append to the same file; each line is flushed on its
//! own so entries never interleave mid-line.

use crate::json_layer::JsonLayer;
use crate::LogConfig;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// `~/.console/logs/dev.jsonl`
pub(crate) fn default_log_path() -> Option<PathBuf> {
    Some(dirs::home_dir()?.join(".console").join("logs").join("dev.jsonl"))
}

/// Shared handle to the open log file. Cloning is cheap; every clone appends
/// to the same file.
#[derive(Clone)]
pub struct LogFile {
    file: Arc<Mutex<LineWriter<File>>>,
}

impl LogFile {
    /// Open `path` for appending, creating missing parent directories.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(LineWriter::new(file))),
        })
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn level_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber described by `config`.
///
/// Returns `false` when a subscriber was already installed.
pub(crate) fn install(config: &LogConfig) -> bool {
    let path = config.log_path.clone().or_else(default_log_path);

    let log_file = path.as_deref().and_then(|p| match LogFile::open(p) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("observability: cannot open {}: {}", p.display(), e);
            None
        }
    });

    // stderr is the only destination left when the file is unavailable.
    let want_stderr = config.also_stderr || log_file.is_none();

    let file_layer = log_file.map(|file| {
        JsonLayer::new(config.service_name.clone(), file)
            .with_filter(level_filter(&config.default_level))
    });
    let stderr_layer = want_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_filter(level_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(service = %config.service_name, path = ?path, "Logging installed");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_file_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deeply").join("nested").join("test.jsonl");

        let mut file = LogFile::open(&path).unwrap();
        writeln!(file, "first").unwrap();
        writeln!(file, "second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_log_file_appends_across_handles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.jsonl");

        writeln!(LogFile::open(&path).unwrap(), "a").unwrap();
        let shared = LogFile::open(&path).unwrap();
        writeln!(shared.make_writer(), "b").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
    }

    #[test]
    fn test_default_path_lives_under_console_dir() {
        if let Some(path) = default_log_path() {
            assert!(path.ends_with(".console/logs/dev.jsonl"));
        }
    }
}
