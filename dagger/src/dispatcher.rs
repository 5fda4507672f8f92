//! Action dispatch pipeline
//!
//! Pipeline: validated action → policy gate (network only) → run → event log → completion
//!
//! DNS, TCP, HTTP and registry queries run as independent background tasks
//! that report back over a channel. File and lock actions are local and fast
//! and run inline on the caller.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::NetworkConfig;
use crate::error::InputError;
use crate::event_log::{EventLog, LogEntry};
use crate::files;
use crate::mutex::LockAdapter;
use crate::net::{dns, http_get::HttpGet, tcp_connect};
use crate::policy::{self, Decision};
use crate::registry::{self, KeyValueStore};

/// One operator-requested action, already validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Dns {
        host: String,
    },
    TcpConnect {
        host: String,
        port: u16,
    },
    HttpGet {
        url: String,
    },
    RegistryQuery {
        key_path: String,
        value_name: Option<String>,
    },
    CreateFile {
        folder: Option<PathBuf>,
        filename: String,
        content: String,
    },
    AcquireLock {
        name: String,
    },
    ReleaseLock,
}

fn required(value: &str, what: &'static str) -> Result<String, InputError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InputError::Missing(what));
    }
    Ok(value.to_string())
}

impl Action {
    pub fn dns(host: &str) -> Result<Self, InputError> {
        Ok(Action::Dns {
            host: required(host, "a domain/host to resolve")?,
        })
    }

    pub fn tcp_connect(host: &str, port: &str) -> Result<Self, InputError> {
        let host = required(host, "IP and port")?;
        let raw = required(port, "IP and port")?;
        let port = match raw.parse::<u16>() {
            Ok(p) if p != 0 => p,
            _ => return Err(InputError::InvalidPort(raw)),
        };
        Ok(Action::TcpConnect { host, port })
    }

    pub fn http_get(url: &str) -> Result<Self, InputError> {
        let url = required(url, "a URL")?;
        policy::url_host(&url)?;
        Ok(Action::HttpGet { url })
    }

    pub fn registry_query(key_path: &str, value_name: Option<&str>) -> Result<Self, InputError> {
        let key_path = required(key_path, "a registry path or simulated key")?;
        let value_name = value_name
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Ok(Action::RegistryQuery {
            key_path,
            value_name,
        })
    }

    /// A blank folder falls back to the configured default at dispatch time
    pub fn create_file(
        folder: Option<&str>,
        filename: &str,
        content: &str,
    ) -> Result<Self, InputError> {
        let filename = required(filename, "a filename")?;
        let folder = folder
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(PathBuf::from);
        Ok(Action::CreateFile {
            folder,
            filename,
            content: content.to_string(),
        })
    }

    pub fn acquire_lock(name: &str) -> Result<Self, InputError> {
        Ok(Action::AcquireLock {
            name: required(name, "a mutex/lock name")?,
        })
    }

    /// Stable action name used in diagnostics
    pub fn label(&self) -> &'static str {
        match self {
            Action::Dns { .. } => "net.dns",
            Action::TcpConnect { .. } => "net.tcp_connect",
            Action::HttpGet { .. } => "net.http_get",
            Action::RegistryQuery { .. } => "registry.query",
            Action::CreateFile { .. } => "files.create",
            Action::AcquireLock { .. } => "mutex.acquire",
            Action::ReleaseLock => "mutex.release",
        }
    }
}

/// Result of one background action
#[derive(Debug, Clone)]
pub struct Completion {
    pub id: Uuid,
    pub action: &'static str,
    pub entry: LogEntry,
}

/// What `dispatch` did with an action
#[derive(Debug)]
pub enum Dispatched {
    /// Running on a worker; its `Completion` will arrive on the channel
    Spawned(Uuid),
    /// Ran inline and has been logged
    Completed(LogEntry),
    /// Refused by the policy gate; nothing ran and nothing was logged
    Blocked(&'static str),
}

pub struct Dispatcher {
    log: Arc<EventLog>,
    store: Arc<dyn KeyValueStore>,
    locks: LockAdapter,
    http: HttpGet,
    connect_timeout: Duration,
    default_folder: PathBuf,
    completions: mpsc::UnboundedSender<Completion>,
    workers: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(
        log: Arc<EventLog>,
        store: Arc<dyn KeyValueStore>,
        locks: LockAdapter,
        network: &NetworkConfig,
        default_folder: PathBuf,
    ) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            log,
            store,
            locks,
            http: HttpGet::new(network.http_timeout(), network.http_body_limit),
            connect_timeout: network.connect_timeout(),
            default_folder,
            completions: tx,
            workers: JoinSet::new(),
        };
        (dispatcher, rx)
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn registry_backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn lock_backend(&self) -> &'static str {
        self.locks.backend()
    }

    pub fn held_lock(&self) -> Option<&str> {
        self.locks.held_name()
    }

    /// Run `action` under the operator's current `allow_external` setting.
    ///
    /// Must be called from within the tokio runtime.
    pub fn dispatch(&mut self, action: Action, allow_external: bool) -> Dispatched {
        let id = Uuid::new_v4();
        let label = action.label();
        info!("Dispatching: id={id} action={label}");

        match action {
            Action::Dns { host } => {
                self.spawn_worker(id, label, async move { dns::execute(&host).await });
                Dispatched::Spawned(id)
            }
            Action::TcpConnect { host, port } => {
                if !policy::decide(&host, allow_external).is_allowed() {
                    return Dispatched::Blocked(policy::TCP_BLOCKED);
                }
                let limit = self.connect_timeout;
                self.spawn_worker(id, label, async move {
                    tcp_connect::execute(&host, port, limit).await
                });
                Dispatched::Spawned(id)
            }
            Action::HttpGet { url } => {
                // unparseable URLs never reach here; if one does, fail closed
                let decision = policy::decide_url(&url, allow_external).unwrap_or(Decision::Block);
                if !decision.is_allowed() {
                    return Dispatched::Blocked(policy::HTTP_BLOCKED);
                }
                let http = self.http.clone();
                self.spawn_worker(id, label, async move {
                    http.execute(&url, allow_external).await
                });
                Dispatched::Spawned(id)
            }
            Action::RegistryQuery {
                key_path,
                value_name,
            } => {
                let store = self.store.clone();
                self.spawn_worker(id, label, async move {
                    let query = tokio::task::spawn_blocking(move || {
                        registry::execute(store.as_ref(), &key_path, value_name.as_deref())
                    });
                    match query.await {
                        Ok(line) => line,
                        Err(e) => format!("Registry query error: {e}"),
                    }
                });
                Dispatched::Spawned(id)
            }
            Action::CreateFile {
                folder,
                filename,
                content,
            } => {
                let folder = folder.unwrap_or_else(|| self.default_folder.clone());
                let msg = files::execute(&folder, &filename, &content);
                Dispatched::Completed(self.log.record(msg))
            }
            Action::AcquireLock { name } => {
                let msg = self.locks.acquire(&name);
                Dispatched::Completed(self.log.record(msg))
            }
            Action::ReleaseLock => {
                let msg = self.locks.release();
                Dispatched::Completed(self.log.record(msg))
            }
        }
    }

    fn spawn_worker<F>(&mut self, id: Uuid, action: &'static str, work: F)
    where
        F: Future<Output = String> + Send + 'static,
    {
        let log = self.log.clone();
        let tx = self.completions.clone();
        let span = info_span!("worker", %id, action);
        self.workers.spawn(
            async move {
                let message = work.await;
                let entry = log.record(message);
                debug!("Worker finished");
                // receiver gone means the console is shutting down
                let _ = tx.send(Completion { id, action, entry });
            }
            .instrument(span),
        );
    }

    /// Workers that have not finished yet
    pub fn in_flight(&mut self) -> usize {
        while self.workers.try_join_next().is_some() {}
        self.workers.len()
    }

    /// Wait until every spawned worker has finished
    pub async fn wait_idle(&mut self) {
        while self.workers.join_next().await.is_some() {}
    }

    /// Abort every in-flight worker
    pub fn shutdown(&mut self) {
        let pending = self.in_flight();
        if pending > 0 {
            info!("Aborting {pending} in-flight action(s)");
        }
        self.workers.abort_all();
    }
}
