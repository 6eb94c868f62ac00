//! Logging setup: size-rotated log file, plus stderr in debug mode.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log file name inside the log directory
pub const LOG_FILE: &str = "claudometer.log";
/// Rotate once the file reaches this size
pub const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;
/// Rotated files kept as `.1` .. `.N`
pub const LOG_BACKUPS: usize = 3;

/// Append-only log file rotated by size
pub struct RotatingFile {
    file_path: PathBuf,
    max_size_bytes: u64,
    backups: usize,
    written: u64,
    writer: Option<BufWriter<File>>,
}

impl RotatingFile {
    /// Open (or create) `file_path` for appending
    pub fn open(file_path: PathBuf, max_size_bytes: u64, backups: usize) -> io::Result<Self> {
        if let Some(dir) = file_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let (writer, written) = Self::open_writer(&file_path)?;
        Ok(Self {
            file_path,
            max_size_bytes,
            backups,
            written,
            writer: Some(writer),
        })
    }

    /// Path of the live log file
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn open_writer(file_path: &Path) -> io::Result<(BufWriter<File>, u64)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok((BufWriter::new(file), len))
    }

    /// Path of the n-th rotated file (`claudometer.log.1` ...)
    fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = self.file_path.as_os_str().to_owned();
        name.push(format!(".{}", n));
        PathBuf::from(name)
    }

    /// Shift backups up by one and start a fresh file
    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        if self.backups == 0 {
            let _ = fs::remove_file(&self.file_path);
        } else {
            let _ = fs::remove_file(self.backup_path(self.backups));
            for n in (1..self.backups).rev() {
                let from = self.backup_path(n);
                if from.exists() {
                    fs::rename(&from, self.backup_path(n + 1))?;
                }
            }
            fs::rename(&self.file_path, self.backup_path(1))?;
        }

        let (writer, written) = Self::open_writer(&self.file_path)?;
        self.writer = Some(writer);
        self.written = written;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.writer.is_none() {
            let (writer, written) = Self::open_writer(&self.file_path)?;
            self.writer = Some(writer);
            self.written = written;
        }
        let n = match self.writer.as_mut() {
            Some(writer) => writer.write(buf)?,
            None => return Ok(0),
        };
        self.written += n as u64;

        if self.written >= self.max_size_bytes {
            self.rotate()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

/// Install the global subscriber.
///
/// Logs always go to `<log_dir>/claudometer.log`; debug mode raises the level
/// and mirrors output to stderr.
pub fn setup_logging(debug: bool, log_dir: &Path) -> Result<PathBuf> {
    let filter = if debug {
        EnvFilter::new("claudometer=debug,claudometer_core=debug")
    } else {
        EnvFilter::new("claudometer=info,claudometer_core=info")
    };

    let file = RotatingFile::open(log_dir.join(LOG_FILE), MAX_LOG_BYTES, LOG_BACKUPS)
        .with_context(|| format!("Failed to open log file in {:?}", log_dir))?;
    let path = file.path().to_path_buf();

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file));
    let stderr_layer = debug.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(path)
}
