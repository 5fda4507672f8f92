//! JSON-file stand-in for the registry on hosts without one
//!
//! Store layout: `{ "<key path>": { "<value name>": <scalar>, ... }, ... }`.
//! The file is re-read on every query and never written after creation.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{KeyValueStore, RegistryError};

/// Marker returned for a value name absent from its key
pub const NOT_PRESENT: &str = "<not present>";

type ValueSet = BTreeMap<String, Value>;
/// Entries stay raw until queried so one bad key cannot break the others
type Store = Map<String, Value>;

#[derive(Debug)]
pub struct SimulatedRegistry {
    path: PathBuf,
}

impl SimulatedRegistry {
    /// Bind to `path`, creating an empty store there if none exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let registry = Self { path: path.into() };
        registry.ensure_store()?;
        Ok(registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_store(&self) -> Result<(), RegistryError> {
        if self.path.exists() {
            return Ok(());
        }
        let io_err = |source| RegistryError::Store {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        fs::write(&self.path, b"{}").map_err(io_err)?;
        info!("Created empty simulated registry at {}", self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<Store, RegistryError> {
        self.ensure_store()?;
        let raw = fs::read(&self.path).map_err(|source| RegistryError::Store {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| RegistryError::MalformedStore {
            path: self.path.clone(),
            source,
        })
    }
}

impl KeyValueStore for SimulatedRegistry {
    fn backend(&self) -> &'static str {
        "simulated"
    }

    fn query(&self, key_path: &str, value_name: Option<&str>) -> Result<String, RegistryError> {
        let mut store = self.load()?;
        // an unknown key reads as an empty value set
        let entry: ValueSet = match store.remove(key_path) {
            Some(raw) => serde_json::from_value(raw).map_err(|source| {
                RegistryError::MalformedStore {
                    path: self.path.clone(),
                    source,
                }
            })?,
            None => ValueSet::new(),
        };

        Ok(match value_name {
            Some(name) => {
                let value = entry
                    .get(name)
                    .map(render)
                    .unwrap_or_else(|| NOT_PRESENT.to_string());
                format!("Simulated registry {key_path} {name} = {value}")
            }
            None => {
                let json = Value::Object(entry.into_iter().collect()).to_string();
                format!("Simulated registry {key_path} = {json}")
            }
        })
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
