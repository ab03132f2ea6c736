use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::time::Duration;

use crate::transfer::Endpoint;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub edit: EditConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EditConfig {
    /// Appended to the study folder name to form the sibling backup folder.
    pub backup_suffix: String,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            backup_suffix: "_backup".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub local_ae: String,
    pub remote_ae: String,
    pub probe_timeout_ms: u64,
    pub association_timeout_ms: u64,
    pub precheck: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 104,
            local_ae: "DICOMSYNC".to_string(),
            remote_ae: "ANY-SCP".to_string(),
            probe_timeout_ms: 3000,
            association_timeout_ms: 60_000,
            precheck: true,
        }
    }
}

impl RemoteConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            local_ae: self.local_ae.clone(),
            remote_ae: self.remote_ae.clone(),
            association_timeout: Duration::from_millis(self.association_timeout_ms),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Loads `Config.toml` (optional) overlaid by `DICOM_SYNC_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(
            Environment::with_prefix("DICOM_SYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
