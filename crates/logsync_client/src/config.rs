//! Client configuration.

use crate::error::{SyncError, SyncResult};
use crate::snapshot;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration for the sync client, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Remote server settings.
    pub server: ServerSection,
    /// Sync loop settings.
    pub sync: SyncSection,
    /// End-to-end encryption settings.
    #[serde(default)]
    pub encryption: EncryptionSection,
    /// Local state settings.
    #[serde(default)]
    pub state: StateSection,
}

/// Remote server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Base URL of the change-log server.
    pub host: String,
    /// Static API token sent as `X-Api-Token` when set.
    #[serde(default)]
    pub api_token: Option<String>,
}

/// Sync loop settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSection {
    /// Graph root directories to synchronize.
    #[serde(default)]
    pub graphs: Vec<PathBuf>,
    /// Seconds between ticks.
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Perform exactly one pass over all graphs, then exit.
    #[serde(default)]
    pub once: bool,
}

/// End-to-end encryption settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EncryptionSection {
    /// Whether file ids and content are encrypted before upload.
    #[serde(default)]
    pub enabled: bool,
    /// Passphrase the key is derived from. Required when enabled.
    #[serde(default)]
    pub key: Option<String>,
}

/// Local state settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateSection {
    /// Directory for snapshots and the last-sync marker.
    /// Defaults to the per-user config directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_interval() -> u64 {
    60
}

impl ClientConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let data = std::fs::read_to_string(path).map_err(|err| {
            SyncError::config(format!("cannot read {}: {err}", path.display()))
        })?;
        let config: ClientConfig = toml::from_str(&data).map_err(|err| {
            SyncError::config(format!("cannot parse {}: {err}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration before any sync starts.
    pub fn validate(&self) -> SyncResult<()> {
        if self.server.host.is_empty() {
            return Err(SyncError::config("server.host is required"));
        }
        if self.sync.graphs.is_empty() {
            return Err(SyncError::config("sync.graphs must not be empty"));
        }
        if self.encryption.enabled
            && self.encryption.key.as_deref().unwrap_or("").is_empty()
        {
            return Err(SyncError::config(
                "encryption.key is required when encryption is enabled",
            ));
        }
        if !self.sync.once && self.sync.interval == 0 {
            return Err(SyncError::config(
                "sync.interval must be set when sync.once is disabled",
            ));
        }
        Ok(())
    }

    /// Resolves the state directory, falling back to the per-user default.
    pub fn state_dir(&self) -> SyncResult<PathBuf> {
        match &self.state.dir {
            Some(dir) => Ok(dir.clone()),
            None => snapshot::default_state_dir(),
        }
    }
}
