//! # Logsync Client
//!
//! Synchronizes local directory trees ("graphs") against a remote
//! change-log server.
//!
//! This crate provides:
//! - Graph scanning and the stable file-id scheme
//! - Snapshot persistence with a last-sync marker
//! - Snapshot diffing and conflict detection
//! - Optional end-to-end encryption (AES-256-GCM)
//! - A blocking HTTP client for the server's wire protocol
//! - The per-graph sync orchestrator and the timer loop
//!
//! ## Sync model
//!
//! Each cycle diffs the filesystem against the last persisted snapshot,
//! cross-references the server's changes since the last sync, skips
//! anything changed on both sides, then downloads and uploads the rest.
//! Conflicts are never merged; they simply wait for the next cycle.
//! Retries are cycle-level: no call inside a cycle retries on its own.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod compare;
pub mod config;
pub mod conflict;
pub mod crypto;
pub mod error;
pub mod graph;
pub mod http;
pub mod remote;
pub mod runner;
pub mod snapshot;
pub mod syncer;

pub use compare::{compare, CompareResult};
pub use config::ClientConfig;
pub use conflict::find_conflicts;
pub use crypto::{ContentCipher, SecretKey};
pub use error::{SyncError, SyncResult};
pub use graph::{Graph, File, ID_SEPARATOR};
pub use http::HttpRemoteClient;
pub use remote::{MemoryRemote, RemoteChangeClient};
pub use snapshot::SnapshotStore;
pub use syncer::{CycleReport, GraphSyncer, RemoteChange};
