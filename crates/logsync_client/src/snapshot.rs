//! Persistence of graph snapshots and the last-sync marker.
//!
//! Each graph gets one JSON snapshot file named after it under the state
//! directory. A separate `.lastsync` marker file holds the time of the
//! most recent completed cycle as an RFC3339 string; it backs up snapshots
//! written before the embedded `lastSync` field existed.

use crate::error::{SyncError, SyncResult};
use crate::graph::Graph;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Name of the last-sync marker file inside the state directory.
const MARKER_FILE: &str = ".lastsync";

/// Loads and saves per-graph snapshots under a state directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Creates a store rooted at the given state directory.
    ///
    /// The directory is created lazily on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the snapshot path for a graph name.
    pub fn snapshot_path(&self, graph_name: &str) -> PathBuf {
        self.dir.join(format!("{graph_name}.json"))
    }

    /// Loads the saved snapshot for a graph, or `None` on first run.
    ///
    /// When the snapshot predates the embedded `lastSync` field (it
    /// deserializes as the epoch), the marker file fills the gap.
    pub fn load(&self, graph_name: &str) -> SyncResult<Option<Graph>> {
        let path = self.snapshot_path(graph_name);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SyncError::fs(path, err)),
        };

        let mut graph: Graph = serde_json::from_str(&data).map_err(|err| {
            SyncError::snapshot(format!("cannot parse {}: {err}", path.display()))
        })?;

        if graph.last_sync == DateTime::<Utc>::UNIX_EPOCH {
            if let Some(marker) = self.load_marker()? {
                graph.last_sync = marker;
            }
        }

        Ok(Some(graph))
    }

    /// Persists a snapshot and refreshes the marker file.
    pub fn save(&self, graph: &Graph) -> SyncResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|err| SyncError::fs(&self.dir, err))?;

        let path = self.snapshot_path(&graph.name);
        let data = serde_json::to_string(graph)
            .map_err(|err| SyncError::snapshot(format!("cannot serialize {}: {err}", graph.name)))?;
        std::fs::write(&path, data).map_err(|err| SyncError::fs(&path, err))?;

        self.save_marker(graph.last_sync)
    }

    /// Reads the last-sync marker, if one exists.
    pub fn load_marker(&self) -> SyncResult<Option<DateTime<Utc>>> {
        let path = self.marker_path();
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SyncError::fs(path, err)),
        };

        let parsed = DateTime::parse_from_rfc3339(data.trim()).map_err(|err| {
            SyncError::snapshot(format!("invalid last-sync marker: {err}"))
        })?;
        Ok(Some(parsed.with_timezone(&Utc)))
    }

    /// Writes the last-sync marker.
    pub fn save_marker(&self, timestamp: DateTime<Utc>) -> SyncResult<()> {
        let path = self.marker_path();
        std::fs::write(&path, timestamp.to_rfc3339()).map_err(|err| SyncError::fs(path, err))
    }

    fn marker_path(&self) -> PathBuf {
        self.dir.join(MARKER_FILE)
    }
}

/// Returns the default state directory, `~/.config/logsync` on Linux.
pub fn default_state_dir() -> SyncResult<PathBuf> {
    directories::ProjectDirs::from("", "", "logsync")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| SyncError::config("cannot determine a home directory for sync state"))
}
