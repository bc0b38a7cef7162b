//! Server configuration.

use crate::error::{ServerError, ServerResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration for the change-log server, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory for stored file content, one subdirectory per graph.
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,
    /// Directory for the change ledger and the file-mapping table.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Static API token required in `X-Api-Token` when set.
    #[serde(default)]
    pub api_token: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_files_dir() -> PathBuf {
    PathBuf::from("files")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            files_dir: default_files_dir(),
            data_dir: default_data_dir(),
            api_token: None,
        }
    }
}

impl ServerConfig {
    /// Loads a configuration file.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let data = std::fs::read_to_string(path).map_err(|err| ServerError::io(path, err))?;
        toml::from_str(&data).map_err(|err| {
            ServerError::storage(format!("cannot parse {}: {err}", path.display()))
        })
    }

    /// Returns the address to bind the listener to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Path of the append-only change ledger file.
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("changelog.jsonl")
    }

    /// Path of the file-mapping table.
    pub fn mappings_path(&self) -> PathBuf {
        self.data_dir.join("mappings.json")
    }

    /// Sets the files directory.
    pub fn with_files_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.files_dir = dir.into();
        self
    }

    /// Sets the data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Enables API token authentication.
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }
}
