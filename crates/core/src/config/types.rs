use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::callback::CallbackConfig;
use crate::converter::ConverterConfig;
use crate::download::DownloadConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::pool::PoolsConfig;
use crate::reaper::ReaperConfig;
use crate::storage::StorageConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub pools: PoolsConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub reaper: ReaperConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Directories the reaper sweeps: the configured roots, or the work
    /// and storage directories when none are configured.
    pub fn reaper_roots(&self) -> Vec<PathBuf> {
        if self.reaper.roots.is_empty() {
            vec![self.orchestrator.work_dir.clone(), self.storage.root.clone()]
        } else {
            self.reaper.roots.clone()
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory that local `path` inputs must live under. When unset, HTTP
    /// clients can only submit URL inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intake_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            intake_dir: None,
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Job store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Database file, used by the sqlite backend.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("convoy.db")
}

/// Available job store backends
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Sqlite => "sqlite",
        }
    }
}

/// Sanitized config for API responses (credentials redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub store: SanitizedStoreConfig,
    pub pools: PoolsConfig,
    pub callback: CallbackConfig,
    pub download: DownloadConfig,
    pub reaper: ReaperConfig,
    pub converter: SanitizedConverterConfig,
    pub storage: SanitizedStorageConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStoreConfig {
    pub backend: String,
}

/// Converter config without argument templates, which may embed credentials.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConverterConfig {
    pub program: String,
    pub args_count: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub public_base_url: String,
}

/// Drop any `user:password@` part of a URL.
fn redact_url(raw: &str) -> String {
    match reqwest::Url::parse(raw) {
        Ok(mut url) => {
            if !url.username().is_empty() || url.password().is_some() {
                let _ = url.set_username("");
                let _ = url.set_password(None);
            }
            url.to_string()
        }
        Err(_) => raw.to_string(),
    }
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            store: SanitizedStoreConfig {
                backend: config.store.backend.as_str().to_string(),
            },
            pools: config.pools.clone(),
            callback: config.callback.clone(),
            download: config.download.clone(),
            reaper: config.reaper.clone(),
            converter: SanitizedConverterConfig {
                program: config.converter.program.display().to_string(),
                args_count: config.converter.args.len(),
                timeout_secs: config.converter.timeout_secs,
            },
            storage: SanitizedStorageConfig {
                public_base_url: redact_url(&config.storage.public_base_url),
            },
            context_url: config.orchestrator.context_url.as_deref().map(redact_url),
        }
    }
}
