//! Logging setup for the mythadder binary.
//!
//! udev runs mythadder with no terminal attached, so the log file is the
//! primary record of what happened. The returned [`LogGuard`] owns the file
//! and flushes it when dropped, on every exit path.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when neither `RUST_LOG` nor the configuration sets one.
pub const DEFAULT_LOG_FILTER: &str = "mythadder=info,mythadder_db=info";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration for one run.
#[derive(Debug, Clone)]
pub struct LogConfig<'a> {
    /// Log file to append to; `None` logs to stderr only
    pub log_file: Option<&'a Path>,
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: &'a str,
    /// Mirror the file filter on stderr instead of warnings only
    pub verbose: bool,
}

/// Keeps the log file open for the lifetime of the run.
#[must_use = "dropping the guard flushes and closes the log file"]
pub struct LogGuard {
    writer: Option<SharedRollingWriter>,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            let _ = writer.flush_all();
        }
    }
}

/// Initialize tracing with an appending file writer and stderr output.
///
/// A log file that cannot be opened is reported on stderr and skipped;
/// logging never aborts the run.
pub fn init_logging(config: LogConfig<'_>) -> LogGuard {
    let file_writer = config.log_file.and_then(|path| {
        SharedRollingWriter::open(path)
            .map_err(|err| eprintln!("Warning: file logging disabled: {err:#}"))
            .ok()
    });

    let file_layer = file_writer.clone().map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(build_filter(config.filter))
    });

    let console_filter = if config.verbose {
        build_filter(config.filter)
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    LogGuard {
        writer: file_writer,
    }
}

fn build_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
}

struct RollingFileAppender {
    path: PathBuf,
    max_files: usize,
    max_size: u64,
    file: Option<File>,
    current_size: u64,
}

impl RollingFileAppender {
    fn new(path: &Path, max_files: usize, max_size: u64) -> io::Result<Self> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut appender = Self {
            path: path.to_path_buf(),
            max_files: max_files.max(1),
            max_size,
            file: None,
            current_size: 0,
        };
        let (file, size) = appender.open_current_file()?;
        appender.file = Some(file);
        appender.current_size = size;
        if appender.current_size > appender.max_size {
            appender.rotate()?;
        }
        Ok(appender)
    }

    fn open_current_file(&self) -> io::Result<(File, u64)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let size = file.metadata()?.len();
        Ok((file, size))
    }

    fn rotated_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        self.rotate_files()?;

        let (file, size) = self.open_current_file()?;
        self.file = Some(file);
        self.current_size = size;
        Ok(())
    }

    fn rotate_files(&self) -> io::Result<()> {
        let max_index = self.max_files.saturating_sub(1);
        if max_index == 0 {
            // Only one file allowed: start it over.
            return File::create(&self.path).map(|_| ());
        }

        let oldest = self.rotated_path(max_index);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }

        for idx in (1..max_index).rev() {
            let src = self.rotated_path(idx);
            if src.exists() {
                fs::rename(&src, self.rotated_path(idx + 1))?;
            }
        }

        if self.path.exists() {
            fs::rename(&self.path, self.rotated_path(1))?;
        }

        Ok(())
    }
}

impl Write for RollingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_size > 0 && self.current_size + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let bytes = file.write(buf)?;
        self.current_size += bytes as u64;
        Ok(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

#[derive(Clone)]
struct SharedRollingWriter {
    inner: Arc<Mutex<RollingFileAppender>>,
}

impl SharedRollingWriter {
    fn open(path: &Path) -> Result<Self> {
        let appender = RollingFileAppender::new(path, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(appender)),
        })
    }

    fn flush_all(&self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.flush()
    }
}

struct SharedRollingWriterGuard {
    inner: Arc<Mutex<RollingFileAppender>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedRollingWriter {
    type Writer = SharedRollingWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedRollingWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedRollingWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_appender_appends_to_existing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mythadder.log");
        fs::write(&path, "earlier run\n").unwrap();

        let mut appender = RollingFileAppender::new(&path, 3, 1024).unwrap();
        appender.write_all(b"this run\n").unwrap();
        appender.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "earlier run\nthis run\n");
    }

    #[test]
    fn test_appender_rotates_when_full() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mythadder.log");

        let mut appender = RollingFileAppender::new(&path, 3, 10).unwrap();
        appender.write_all(b"0123456789").unwrap();
        appender.write_all(b"abcdefghij").unwrap();
        appender.write_all(b"ABCDEFGHIJ").unwrap();
        appender.write_all(b"last").unwrap();
        appender.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "last");
        assert_eq!(
            fs::read_to_string(tmp.path().join("mythadder.log.1")).unwrap(),
            "ABCDEFGHIJ"
        );
        assert_eq!(
            fs::read_to_string(tmp.path().join("mythadder.log.2")).unwrap(),
            "abcdefghij"
        );
        assert!(!tmp.path().join("mythadder.log.3").exists());
    }

    #[test]
    fn test_appender_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("var").join("log").join("mythadder.log");

        let mut appender = RollingFileAppender::new(&path, 2, 1024).unwrap();
        appender.write_all(b"hello").unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_shared_writer_flushes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shared.log");

        let writer = SharedRollingWriter::open(&path).unwrap();
        let mut handle = tracing_subscriber::fmt::MakeWriter::make_writer(&writer);
        handle.write_all(b"line\n").unwrap();
        writer.flush_all().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "line\n");
    }
}
