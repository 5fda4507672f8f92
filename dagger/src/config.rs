//! DAGGER configuration loading and parsing

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "dagger.toml";

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct DaggerConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub locks: LocksConfig,
    #[serde(default)]
    pub files: FilesConfig,
    /// File the configuration was read from; `None` means built-in defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_file: default_log_file(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_http_body_limit")]
    pub http_body_limit: usize,
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            http_timeout_secs: default_http_timeout(),
            http_body_limit: default_http_body_limit(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    /// Use the JSON store even on hosts with a native registry
    #[serde(default)]
    pub force_simulated: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            force_simulated: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LocksConfig {
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,
    #[serde(default)]
    pub force_simulated: bool,
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            lock_dir: default_lock_dir(),
            force_simulated: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FilesConfig {
    /// Folder used when the operator leaves the target folder blank
    #[serde(default = "default_folder")]
    pub default_folder: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            default_folder: default_folder(),
        }
    }
}

// Default value functions
fn default_log_level() -> String { "info".into() }
fn default_log_file() -> PathBuf { PathBuf::from("logs").join("ioc_sim.log") }
fn default_connect_timeout() -> u64 { 5 }
fn default_http_timeout() -> u64 { 8 }
fn default_http_body_limit() -> usize { 512 }
fn default_store_path() -> PathBuf { PathBuf::from("sim_registry.json") }
fn default_lock_dir() -> PathBuf { std::env::temp_dir() }

fn default_folder() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    home.join("temp_ioc")
}

/// Load configuration from `$DAGGER_CONFIG`, falling back to `./dagger.toml`
pub fn load_config() -> Result<DaggerConfig> {
    let config_path = std::env::var("DAGGER_CONFIG")
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_from(Path::new(&config_path))
}

pub fn load_from(path: &Path) -> Result<DaggerConfig> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let mut config: DaggerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    } else {
        Ok(DaggerConfig::default())
    }
}
