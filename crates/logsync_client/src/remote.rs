//! Remote change-log client abstraction.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use logsync_protocol::{ChangeLogEntry, Operation};
use parking_lot::Mutex;
use std::collections::HashMap;

/// A client for the remote change-log server.
///
/// Calls are synchronous and carry no internal retry; a failed call is
/// retried at cycle level on the next tick. The trait is the seam for
/// substituting test doubles for the HTTP implementation.
pub trait RemoteChangeClient: Send + Sync {
    /// Fetches the changes for a graph with a timestamp strictly after
    /// `since`.
    fn changes(&self, graph: &str, since: DateTime<Utc>) -> SyncResult<Vec<ChangeLogEntry>>;

    /// Fetches the content stored for a file id.
    fn content(&self, graph: &str, file_id: &str) -> SyncResult<Vec<u8>>;

    /// Uploads file content under a Create or Modify operation.
    #[allow(clippy::too_many_arguments)]
    fn upload(
        &self,
        graph: &str,
        transaction_id: &str,
        operation: Operation,
        file_id: &str,
        last_change: DateTime<Utc>,
        content: Vec<u8>,
    ) -> SyncResult<()>;

    /// Announces a file deletion.
    fn delete(
        &self,
        graph: &str,
        transaction_id: &str,
        file_id: &str,
        last_change: DateTime<Utc>,
    ) -> SyncResult<()>;
}

/// One recorded upload, for assertions in tests.
#[derive(Debug, Clone)]
pub struct UploadRecord {
    /// Graph name.
    pub graph: String,
    /// Transaction the upload belonged to.
    pub transaction_id: String,
    /// Operation submitted.
    pub operation: Operation,
    /// Wire file id (encrypted when encryption was on).
    pub file_id: String,
    /// Modification time submitted.
    pub last_change: DateTime<Utc>,
    /// Content bytes submitted.
    pub content: Vec<u8>,
}

/// One recorded delete, for assertions in tests.
#[derive(Debug, Clone)]
pub struct DeleteRecord {
    /// Graph name.
    pub graph: String,
    /// Transaction the delete belonged to.
    pub transaction_id: String,
    /// Wire file id.
    pub file_id: String,
    /// Modification time submitted.
    pub last_change: DateTime<Utc>,
}

/// An in-memory remote for testing the orchestrator without a server.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    changes: Mutex<Vec<ChangeLogEntry>>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
    uploads: Mutex<Vec<UploadRecord>>,
    deletes: Mutex<Vec<DeleteRecord>>,
    fail_changes: std::sync::atomic::AtomicBool,
}

impl MemoryRemote {
    /// Creates an empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a change entry the next `changes` call will return.
    pub fn push_change(&self, entry: ChangeLogEntry) {
        self.changes.lock().push(entry);
    }

    /// Sets the content served for a file id.
    pub fn set_content(&self, file_id: impl Into<String>, content: Vec<u8>) {
        self.contents.lock().insert(file_id.into(), content);
    }

    /// Makes subsequent `changes` calls fail with a network error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.fail_changes
            .store(unreachable, std::sync::atomic::Ordering::SeqCst);
    }

    /// Returns all recorded uploads.
    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.uploads.lock().clone()
    }

    /// Returns all recorded deletes.
    pub fn deletes(&self) -> Vec<DeleteRecord> {
        self.deletes.lock().clone()
    }
}

impl RemoteChangeClient for MemoryRemote {
    fn changes(&self, graph: &str, since: DateTime<Utc>) -> SyncResult<Vec<ChangeLogEntry>> {
        if self.fail_changes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(SyncError::network("remote unreachable"));
        }

        let mut entries: Vec<ChangeLogEntry> = self
            .changes
            .lock()
            .iter()
            .filter(|e| e.graph_name == graph && e.timestamp > since)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }

    fn content(&self, _graph: &str, file_id: &str) -> SyncResult<Vec<u8>> {
        self.contents
            .lock()
            .get(file_id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(file_id.to_string()))
    }

    fn upload(
        &self,
        graph: &str,
        transaction_id: &str,
        operation: Operation,
        file_id: &str,
        last_change: DateTime<Utc>,
        content: Vec<u8>,
    ) -> SyncResult<()> {
        self.uploads.lock().push(UploadRecord {
            graph: graph.to_string(),
            transaction_id: transaction_id.to_string(),
            operation,
            file_id: file_id.to_string(),
            last_change,
            content,
        });
        Ok(())
    }

    fn delete(
        &self,
        graph: &str,
        transaction_id: &str,
        file_id: &str,
        last_change: DateTime<Utc>,
    ) -> SyncResult<()> {
        self.deletes.lock().push(DeleteRecord {
            graph: graph.to_string(),
            transaction_id: transaction_id.to_string(),
            file_id: file_id.to_string(),
            last_change,
        });
        Ok(())
    }
}
