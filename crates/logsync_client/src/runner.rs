//! The timer-driven sync loop.
//!
//! One thread, one tick at a time: every graph syncs sequentially within
//! a tick and a cycle always runs to completion before the loop sleeps,
//! so cycles can never overlap.

use crate::config::ClientConfig;
use crate::crypto::{ContentCipher, SecretKey};
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteChangeClient;
use crate::snapshot::SnapshotStore;
use crate::syncer::GraphSyncer;
use std::time::Duration;
use tracing::{error, info};

/// Runs the sync loop until stopped, or a single pass in `once` mode.
///
/// Per-file and per-graph failures are logged and retried on the next
/// tick; only setup problems make this function return an error.
pub fn run<R: RemoteChangeClient>(config: &ClientConfig, remote: &R) -> SyncResult<()> {
    let snapshots = SnapshotStore::new(config.state_dir()?);
    let cipher = build_cipher(config)?;

    loop {
        run_tick(config, remote, &snapshots, cipher.as_ref());

        if config.sync.once {
            info!("single pass finished");
            return Ok(());
        }
        std::thread::sleep(Duration::from_secs(config.sync.interval));
    }
}

/// Syncs every configured graph once, in order.
pub fn run_tick<R: RemoteChangeClient>(
    config: &ClientConfig,
    remote: &R,
    snapshots: &SnapshotStore,
    cipher: Option<&ContentCipher>,
) {
    for graph_path in &config.sync.graphs {
        let syncer = GraphSyncer::new(graph_path, remote, snapshots, cipher);
        match syncer.sync_cycle() {
            Ok(report) => {
                info!(
                    graph = %report.graph,
                    downloaded = report.downloaded,
                    uploaded = report.uploaded,
                    "graph synced"
                );
            }
            Err(err) => {
                // retried on the next tick
                error!(graph = %graph_path.display(), error = %err, "sync cycle failed");
            }
        }
    }
}

fn build_cipher(config: &ClientConfig) -> SyncResult<Option<ContentCipher>> {
    if !config.encryption.enabled {
        return Ok(None);
    }
    let passphrase = config
        .encryption
        .key
        .as_deref()
        .ok_or_else(|| SyncError::config("encryption.key is required"))?;
    Ok(Some(ContentCipher::new(&SecretKey::from_passphrase(
        passphrase,
    ))))
}
