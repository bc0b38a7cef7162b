//! Integration tests for the sync client against the real server handlers.

use chrono::{DateTime, SecondsFormat, Utc};
use logsync_client::{
    ContentCipher, GraphSyncer, RemoteChangeClient, SnapshotStore, SyncError, SyncResult,
};
use logsync_protocol::{ChangeLogEntry, Operation};
use logsync_server::{HandlerContext, RequestHandler, ServerConfig, ServerError, UploadRequest};
use std::path::PathBuf;
use std::sync::Arc;

/// A remote client that calls the server handlers in-process, encoding
/// parameters the same way the HTTP transport does.
struct InProcessRemote {
    handler: RequestHandler,
}

impl InProcessRemote {
    fn new() -> Self {
        let context = Arc::new(HandlerContext::in_memory(ServerConfig::default()));
        Self {
            handler: RequestHandler::new(context),
        }
    }
}

fn to_sync_error(err: ServerError) -> SyncError {
    if err.is_not_found() {
        SyncError::NotFound(err.to_string())
    } else {
        SyncError::status(err.status_code())
    }
}

impl RemoteChangeClient for InProcessRemote {
    fn changes(&self, graph: &str, since: DateTime<Utc>) -> SyncResult<Vec<ChangeLogEntry>> {
        Ok(self.handler.changes(graph, since.timestamp_millis()))
    }

    fn content(&self, graph: &str, file_id: &str) -> SyncResult<Vec<u8>> {
        self.handler.content(graph, file_id).map_err(to_sync_error)
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
        self.handler
            .upload(
                graph,
                UploadRequest {
                    file_id: file_id.to_string(),
                    content,
                    transaction_id: transaction_id.to_string(),
                    operation: operation.as_code().to_string(),
                    modified_date: Some(
                        last_change.to_rfc3339_opts(SecondsFormat::Secs, true),
                    ),
                },
            )
            .map_err(to_sync_error)
    }

    fn delete(
        &self,
        graph: &str,
        transaction_id: &str,
        file_id: &str,
        last_change: DateTime<Utc>,
    ) -> SyncResult<()> {
        self.handler
            .delete(
                graph,
                file_id,
                transaction_id,
                Some(last_change.timestamp_millis()),
            )
            .map_err(to_sync_error)
    }
}

/// One client machine: a graph directory plus its own snapshot state.
struct Client {
    _dir: tempfile::TempDir,
    graph_path: PathBuf,
    snapshots: SnapshotStore,
}

impl Client {
    fn new(graph_name: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = dir.path().join(graph_name);
        std::fs::create_dir_all(&graph_path).unwrap();
        let snapshots = SnapshotStore::new(dir.path().join("state"));
        Self {
            _dir: dir,
            graph_path,
            snapshots,
        }
    }

    fn write(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.graph_path.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    fn sync(&self, remote: &InProcessRemote) -> logsync_client::CycleReport {
        GraphSyncer::new(&self.graph_path, remote, &self.snapshots, None)
            .sync_cycle()
            .unwrap()
    }

    fn sync_encrypted(
        &self,
        remote: &InProcessRemote,
        cipher: &ContentCipher,
    ) -> logsync_client::CycleReport {
        GraphSyncer::new(&self.graph_path, remote, &self.snapshots, Some(cipher))
            .sync_cycle()
            .unwrap()
    }

    /// Rewinds a snapshot entry's recorded change time, making the file
    /// look locally modified on the next scan.
    fn age_snapshot_entry(&self, graph_name: &str, file_id: &str) {
        self.shift_snapshot_entry(graph_name, file_id, -chrono::Duration::hours(1));
    }

    fn shift_snapshot_entry(&self, graph_name: &str, file_id: &str, by: chrono::Duration) {
        let mut saved = self.snapshots.load(graph_name).unwrap().unwrap();
        let mut file = saved.file(file_id).unwrap().clone();
        file.last_change = file.last_change + by;
        saved.add_or_update(file);
        self.snapshots.save(&saved).unwrap();
    }
}

/// Uploads truncate timestamps to whole seconds, so edits landing in the
/// same second as the previous version would collide with its ledger
/// identity. Real edits are seconds apart; tests wait the second out.
fn wait_for_next_second() {
    std::thread::sleep(std::time::Duration::from_millis(1100));
}

#[test]
fn create_propagates_to_second_client() {
    let remote = InProcessRemote::new();
    let a = Client::new("notes");
    let b = Client::new("notes");

    a.write("pages/shared.md", b"written on a");
    let report = a.sync(&remote);
    assert_eq!(report.uploaded, 1);

    let report = b.sync(&remote);
    assert_eq!(report.downloaded, 1);
    assert_eq!(
        std::fs::read(b.graph_path.join("pages").join("shared.md")).unwrap(),
        b"written on a"
    );
}

#[test]
fn modify_propagates_to_second_client() {
    let remote = InProcessRemote::new();
    let a = Client::new("notes");
    let b = Client::new("notes");

    a.write("doc.md", b"v1");
    a.sync(&remote);
    b.sync(&remote);

    // a edits the file; age the snapshot so the edit registers even on
    // filesystems with coarse mtimes
    wait_for_next_second();
    a.write("doc.md", b"v2");
    a.age_snapshot_entry("notes", "doc.md");
    let report = a.sync(&remote);
    assert_eq!(report.uploaded, 1);

    let report = b.sync(&remote);
    assert_eq!(report.downloaded, 1);
    assert_eq!(std::fs::read(b.graph_path.join("doc.md")).unwrap(), b"v2");
}

#[test]
fn delete_reaches_a_client_syncing_later() {
    let remote = InProcessRemote::new();
    let a = Client::new("notes");
    let b = Client::new("notes");

    a.write("temp.md", b"short-lived");
    a.sync(&remote);

    std::fs::remove_file(a.graph_path.join("temp.md")).unwrap();
    // the delete reports the snapshot entry's change time; push it past
    // the create so the two ledger identities cannot coincide
    a.shift_snapshot_entry("notes", "temp.md", chrono::Duration::milliseconds(1500));
    let report = a.sync(&remote);
    assert_eq!(report.uploaded, 1);

    // b's first sync sees the create and the delete; only the delete,
    // being the newest entry for the id, is applied
    let report = b.sync(&remote);
    assert_eq!(report.downloaded, 1);
    assert!(!b.graph_path.join("temp.md").exists());
}

#[test]
fn identical_resubmission_leaves_one_ledger_row() {
    let remote = InProcessRemote::new();
    let a = Client::new("notes");

    a.write("stable.md", b"same bytes");
    a.sync(&remote);
    assert_eq!(remote.handler.changes("notes", 0).len(), 1);

    // wipe the snapshot: the next cycle re-reports the same file with the
    // same mtime, replaying the identical upload
    std::fs::remove_file(a.snapshots.snapshot_path("notes")).unwrap();
    let mut fresh = logsync_client::Graph::new("notes");
    fresh.last_sync = Utc::now();
    a.snapshots.save(&fresh).unwrap();

    let report = a.sync(&remote);
    assert_eq!(report.uploaded, 1);
    assert_eq!(remote.handler.changes("notes", 0).len(), 1);
}

#[test]
fn concurrent_edits_conflict_and_are_skipped() {
    let remote = InProcessRemote::new();
    let a = Client::new("notes");
    let b = Client::new("notes");

    a.write("fought-over.md", b"base");
    a.sync(&remote);
    b.sync(&remote);

    // a pushes a new version
    wait_for_next_second();
    a.write("fought-over.md", b"version a");
    a.age_snapshot_entry("notes", "fought-over.md");
    a.sync(&remote);

    // b edited the same file without syncing first
    b.write("fought-over.md", b"version b");
    b.age_snapshot_entry("notes", "fought-over.md");
    let report = b.sync(&remote);

    assert_eq!(report.conflicts, vec!["fought-over.md".to_string()]);
    assert_eq!(report.downloaded, 0);
    // b keeps its local version and pushed nothing
    assert_eq!(
        std::fs::read(b.graph_path.join("fought-over.md")).unwrap(),
        b"version b"
    );
    let server_side = remote
        .handler
        .content("notes", "fought-over.md")
        .unwrap();
    assert_eq!(server_side, b"version a");
}

#[test]
fn snapshot_persists_across_cycles() {
    let remote = InProcessRemote::new();
    let a = Client::new("notes");

    a.write("once.md", b"only once");
    let report = a.sync(&remote);
    assert_eq!(report.uploaded, 1);

    // nothing changed: the second cycle is a no-op
    let report = a.sync(&remote);
    assert_eq!(report.uploaded, 0);
    assert_eq!(report.downloaded, 0);
    assert_eq!(remote.handler.changes("notes", 0).len(), 1);
}

#[test]
fn encrypted_sync_roundtrips_through_the_server() {
    let remote = InProcessRemote::new();
    let a = Client::new("notes");
    let b = Client::new("notes");
    let cipher_a = ContentCipher::from_passphrase("shared secret");
    let cipher_b = ContentCipher::from_passphrase("shared secret");

    a.write("private.md", b"for our eyes only");
    let report = a.sync_encrypted(&remote, &cipher_a);
    assert_eq!(report.uploaded, 1);

    // the server only ever sees the encrypted id
    let entries = remote.handler.changes("notes", 0);
    assert_eq!(entries.len(), 1);
    assert_ne!(entries[0].file_id, "private.md");
    assert!(entries[0].file_id.chars().all(|c| c.is_ascii_hexdigit()));

    let report = b.sync_encrypted(&remote, &cipher_b);
    assert_eq!(report.downloaded, 1);
    assert_eq!(
        std::fs::read(b.graph_path.join("private.md")).unwrap(),
        b"for our eyes only"
    );
}

#[test]
fn transactions_group_a_cycle() {
    let remote = InProcessRemote::new();
    let a = Client::new("notes");

    a.write("one.md", b"1");
    a.write("two.md", b"2");
    a.sync(&remote);

    let summaries = remote.handler.transactions(None, None);
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].count, 2);

    let changes = remote
        .handler
        .transaction_changes(&summaries[0].id, None, None);
    assert_eq!(changes.len(), 2);
}
