//! Event log — append-only, one timestamped line per action outcome
//!
//! The file is opened, appended and closed on every write so short-lived
//! workers never hold a descriptor. Append mode keeps each line whole when
//! several workers finish at once; their relative order is not guaranteed.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::error;

/// One persisted log line
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }

    /// `<ISO-8601 UTC timestamp> <message>` without the trailing newline
    pub fn to_line(&self) -> String {
        format!(
            "{} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, false),
            self.message
        )
    }
}

/// Append-only log sink shared by the console and every worker
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory {}", parent.display())
                })?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamp `message` and append it to the log file.
    ///
    /// A write failure is reported through tracing and the entry is still
    /// returned so the caller can display it.
    pub fn record(&self, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry::now(message);
        if let Err(e) = self.append(&entry) {
            error!("Failed to write event log {}: {e:#}", self.path.display());
        }
        entry
    }

    fn append(&self, entry: &LogEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("cannot open {}", self.path.display()))?;
        // single write call so the line lands in one append
        let line = format!("{}\n", entry.to_line());
        file.write_all(line.as_bytes())
            .with_context(|| format!("cannot append to {}", self.path.display()))?;
        Ok(())
    }

    /// Full log file contents, or `None` when nothing has been logged yet
    pub fn read_all(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("cannot read {}", self.path.display())),
        }
    }
}
