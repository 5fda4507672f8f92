//! Mutex/lock adapter — create and release one named resource
//!
//! Backends:
//! - Windows: a named kernel mutex (`CreateMutexW`)
//! - Elsewhere (or when forced): an exclusively-created lock file holding the PID
//!
//! The adapter tracks a single acquisition. Acquiring again while one is
//! tracked replaces the tracked reference without releasing the earlier
//! resource; the adapter reports that abandonment instead of hiding it.

pub mod lockfile;
#[cfg(windows)]
pub mod windows;

use std::io;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::LocksConfig;

pub use lockfile::LockFileBackend;

/// Result line for `release` with nothing tracked
pub const NOTHING_TO_RELEASE: &str = "No mutex/lock to release";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Mutex/lock '{0}' already exists")]
    AlreadyExists(String),
    #[error("lock name '{0}' must not contain path separators")]
    InvalidName(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[cfg_attr(not(windows), allow(dead_code))]
    #[error("{op} failed: os error {code}")]
    Os { op: &'static str, code: u32 },
}

/// Backend that creates named resources
pub trait NamedLock {
    fn backend(&self) -> &'static str;

    fn acquire(&self, name: &str) -> Result<Box<dyn HeldLock>, LockError>;
}

/// One acquired resource
pub trait HeldLock {
    fn name(&self) -> &str;

    /// Result line reported on creation
    fn created_message(&self) -> String;

    /// Give the resource back; returns the result line
    fn release(&self) -> Result<String, LockError>;
}

pub struct LockAdapter {
    backend: Box<dyn NamedLock>,
    held: Option<Box<dyn HeldLock>>,
}

impl LockAdapter {
    pub fn new(backend: Box<dyn NamedLock>) -> Self {
        Self {
            backend,
            held: None,
        }
    }

    pub fn backend(&self) -> &'static str {
        self.backend.backend()
    }

    /// Name of the tracked acquisition, if any
    pub fn held_name(&self) -> Option<&str> {
        self.held.as_deref().map(|h| h.name())
    }

    /// UNHELD/HELD → HELD on success; tracking is unchanged on failure
    pub fn acquire(&mut self, name: &str) -> String {
        match self.backend.acquire(name) {
            Ok(lock) => {
                let mut msg = lock.created_message();
                info!("Lock acquired: {name} ({})", self.backend.backend());
                if let Some(previous) = self.held.replace(lock) {
                    warn!(
                        "Lock '{}' is no longer tracked and was not released",
                        previous.name()
                    );
                    msg.push_str(&format!(
                        " (previous lock '{}' abandoned without release)",
                        previous.name()
                    ));
                }
                msg
            }
            Err(e @ LockError::AlreadyExists(_)) => e.to_string(),
            Err(e) => format!("Mutex create error: {e}"),
        }
    }

    /// HELD → UNHELD on success; a failed release keeps the lock tracked
    pub fn release(&mut self) -> String {
        let Some(lock) = self.held.as_deref() else {
            return NOTHING_TO_RELEASE.to_string();
        };
        match lock.release() {
            Ok(msg) => {
                info!("Lock released: {}", lock.name());
                self.held = None;
                msg
            }
            Err(e) => format!("Mutex release error: {e}"),
        }
    }
}

/// Pick the backend for this host
pub fn open_locks(config: &LocksConfig) -> anyhow::Result<LockAdapter> {
    #[cfg(windows)]
    if !config.force_simulated {
        info!("Lock backend: native mutex");
        return Ok(LockAdapter::new(Box::new(windows::NativeMutexBackend)));
    }

    let backend = LockFileBackend::new(&config.lock_dir)?;
    info!(
        "Lock backend: lock files in {} (forced={})",
        config.lock_dir.display(),
        config.force_simulated
    );
    Ok(LockAdapter::new(Box::new(backend)))
}
