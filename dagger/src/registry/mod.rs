//! Registry adapter — read-only key/value queries
//!
//! One read interface over two backends, chosen once at startup:
//! - Windows: the native registry, opened read-only
//! - Elsewhere (or when forced): a JSON file standing in for it

pub mod simulated;
#[cfg(windows)]
pub mod windows;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::RegistryConfig;

pub use simulated::SimulatedRegistry;

/// Read-only key/value store
pub trait KeyValueStore: Send + Sync {
    /// Short backend label for status output
    fn backend(&self) -> &'static str;

    /// Read one value, or every value under `key_path` when `value_name` is
    /// `None`. Returns the result line to show the operator.
    fn query(&self, key_path: &str, value_name: Option<&str>) -> Result<String, RegistryError>;
}

#[cfg_attr(not(windows), allow(dead_code))]
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown root key '{0}'")]
    UnknownRoot(String),
    #[error("{op} failed for '{path}': os error {code}")]
    Os {
        op: &'static str,
        path: String,
        code: u32,
    },
    #[error("malformed store file {}: {source}", path.display())]
    MalformedStore {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot access store file {}: {source}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Run a query and fold any failure into the result line
pub fn execute(store: &dyn KeyValueStore, key_path: &str, value_name: Option<&str>) -> String {
    match store.query(key_path, value_name) {
        Ok(line) => line,
        Err(e) => format!("Registry query error: {e}"),
    }
}

/// Pick the backend for this host
pub fn open_store(config: &RegistryConfig) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    #[cfg(windows)]
    if !config.force_simulated {
        info!("Registry backend: native");
        return Ok(Arc::new(windows::NativeRegistry));
    }

    let store = SimulatedRegistry::open(&config.store_path)?;
    info!(
        "Registry backend: simulated ({}, forced={})",
        store.path().display(),
        config.force_simulated
    );
    Ok(Arc::new(store))
}

/// Predefined registry roots
#[cfg_attr(not(windows), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKey {
    ClassesRoot,
    CurrentUser,
    LocalMachine,
    Users,
    CurrentConfig,
}

#[cfg_attr(not(windows), allow(dead_code))]
impl RootKey {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "HKEY_CLASSES_ROOT" | "HKCR" => Some(Self::ClassesRoot),
            "HKEY_CURRENT_USER" | "HKCU" => Some(Self::CurrentUser),
            "HKEY_LOCAL_MACHINE" | "HKLM" => Some(Self::LocalMachine),
            "HKEY_USERS" | "HKU" => Some(Self::Users),
            "HKEY_CURRENT_CONFIG" | "HKCC" => Some(Self::CurrentConfig),
            _ => None,
        }
    }
}

/// `root` and `sub_path` of a key path like `HKEY_CURRENT_USER\\Software\Foo`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPath<'a> {
    pub root: &'a str,
    pub sub_path: &'a str,
}

/// Split at the first backslash pair; paths typed with a single separator
/// fall back to the first single backslash.
#[cfg_attr(not(windows), allow(dead_code))]
pub fn split_key_path(key_path: &str) -> KeyPath<'_> {
    let (root, sub_path) = key_path
        .split_once("\\\\")
        .or_else(|| key_path.split_once('\\'))
        .unwrap_or((key_path, ""));
    KeyPath { root, sub_path }
}

/// A decoded registry value
#[cfg_attr(not(windows), allow(dead_code))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegValue {
    Text(String),
    MultiText(Vec<String>),
    Dword(u32),
    Qword(u64),
    Binary(Vec<u8>),
}

#[cfg_attr(not(windows), allow(dead_code))]
impl RegValue {
    /// NUL-terminated UTF-16LE bytes as a string
    pub fn text_from_utf16le(data: &[u8]) -> String {
        let units = utf16_units(data);
        let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        String::from_utf16_lossy(&units[..end])
    }

    /// Double-NUL-terminated list of UTF-16LE strings
    pub fn multi_from_utf16le(data: &[u8]) -> Vec<String> {
        utf16_units(data)
            .split(|&u| u == 0)
            .filter(|s| !s.is_empty())
            .map(String::from_utf16_lossy)
            .collect()
    }
}

#[cfg_attr(not(windows), allow(dead_code))]
fn utf16_units(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

impl fmt::Display for RegValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegValue::Text(s) => f.write_str(s),
            RegValue::MultiText(items) => f.write_str(&items.join(",")),
            RegValue::Dword(v) => write!(f, "{v}"),
            RegValue::Qword(v) => write!(f, "{v}"),
            RegValue::Binary(bytes) => {
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}
