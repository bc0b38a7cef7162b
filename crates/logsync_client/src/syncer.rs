//! Per-graph sync orchestration.
//!
//! One [`GraphSyncer`] drives one graph through a full cycle: load the
//! saved snapshot, fetch remote changes, scan the filesystem, diff,
//! detect conflicts, download, upload, persist. Failures before the
//! transfer phases abort the whole cycle; failures inside them are
//! per-file and leave the affected snapshot entry untouched so the file
//! is retried on the next cycle.

use crate::compare::{compare, CompareResult};
use crate::conflict::find_conflicts;
use crate::crypto::ContentCipher;
use crate::error::{SyncError, SyncResult};
use crate::graph::{self, File, Graph};
use crate::remote::RemoteChangeClient;
use crate::snapshot::SnapshotStore;
use chrono::{DateTime, Utc};
use logsync_protocol::{ChangeLogEntry, Operation};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, error, info};
use uuid::Uuid;

/// A remote change entry paired with its plaintext file id.
///
/// On the wire the id may be an encrypted blob; it is decrypted once at
/// fetch time so conflict detection and local path resolution always work
/// on plaintext.
#[derive(Debug, Clone)]
pub struct RemoteChange {
    /// The wire entry as the server returned it.
    pub entry: ChangeLogEntry,
    /// Decrypted file id.
    pub plain_id: String,
}

/// Outcome of one sync cycle, for logging and tests.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Graph the cycle ran for.
    pub graph: String,
    /// Remote changes applied locally.
    pub downloaded: usize,
    /// Local changes pushed to the server (uploads and deletes).
    pub uploaded: usize,
    /// File ids skipped as conflicted this cycle.
    pub conflicts: Vec<String>,
    /// Files skipped because of per-file errors.
    pub skipped: usize,
}

/// Orchestrates sync cycles for a single graph.
pub struct GraphSyncer<'a, R: RemoteChangeClient> {
    graph_path: PathBuf,
    remote: &'a R,
    snapshots: &'a SnapshotStore,
    cipher: Option<&'a ContentCipher>,
}

impl<'a, R: RemoteChangeClient> GraphSyncer<'a, R> {
    /// Creates a syncer for the graph rooted at `graph_path`.
    pub fn new(
        graph_path: impl Into<PathBuf>,
        remote: &'a R,
        snapshots: &'a SnapshotStore,
        cipher: Option<&'a ContentCipher>,
    ) -> Self {
        Self {
            graph_path: graph_path.into(),
            remote,
            snapshots,
            cipher,
        }
    }

    /// Runs one full sync cycle.
    ///
    /// Returns an error only when the cycle could not run at all
    /// (snapshot load, remote fetch or filesystem scan failed); transfer
    /// errors are contained per file and reported in the cycle report.
    pub fn sync_cycle(&self) -> SyncResult<CycleReport> {
        let name = graph::graph_name(&self.graph_path)?;
        let _span = tracing::info_span!("sync_cycle", graph = %name).entered();

        let started = Utc::now();
        let mut saved = self
            .snapshots
            .load(&name)?
            .unwrap_or_else(|| Graph::new(name.clone()));

        let remote_changes = self.fetch_remote_changes(&name, saved.last_sync)?;
        let current = graph::scan(&self.graph_path)?;
        let diff = compare(&saved, &current);
        debug!(
            remote = remote_changes.len(),
            created = diff.created.len(),
            changed = diff.changed.len(),
            deleted = diff.deleted.len(),
            "cycle state"
        );

        let remote_ids: Vec<String> = remote_changes
            .iter()
            .map(|c| c.plain_id.clone())
            .collect();
        let conflicts = find_conflicts(&remote_ids, &diff);

        let mut report = CycleReport {
            graph: name.clone(),
            conflicts: conflicts.iter().cloned().collect(),
            ..CycleReport::default()
        };

        self.download_phase(&name, &remote_changes, &conflicts, &mut saved, &mut report);

        // One transaction id covers everything this cycle pushes.
        let transaction_id = Uuid::new_v4().to_string();
        self.upload_phase(
            &name,
            &transaction_id,
            &diff,
            &conflicts,
            &mut saved,
            &mut report,
        );

        saved.last_sync = started;
        self.snapshots.save(&saved)?;

        info!(
            downloaded = report.downloaded,
            uploaded = report.uploaded,
            conflicts = report.conflicts.len(),
            skipped = report.skipped,
            "sync cycle complete"
        );
        Ok(report)
    }

    /// Fetches remote changes and resolves their plaintext ids.
    ///
    /// An entry whose id cannot be decrypted is logged and dropped; the
    /// rest of the batch stays usable.
    fn fetch_remote_changes(
        &self,
        graph_name: &str,
        since: DateTime<Utc>,
    ) -> SyncResult<Vec<RemoteChange>> {
        let entries = self.remote.changes(graph_name, since)?;
        let mut changes = Vec::with_capacity(entries.len());

        for entry in entries {
            let plain_id = match self.cipher {
                Some(cipher) => match cipher.decrypt_id(&entry.file_id) {
                    Ok(id) => id,
                    Err(err) => {
                        error!(file = %entry.file_id, error = %err, "cannot decrypt remote file id");
                        continue;
                    }
                },
                None => entry.file_id.clone(),
            };
            changes.push(RemoteChange { entry, plain_id });
        }

        Ok(changes)
    }

    fn download_phase(
        &self,
        graph_name: &str,
        changes: &[RemoteChange],
        conflicts: &BTreeSet<String>,
        saved: &mut Graph,
        report: &mut CycleReport,
    ) {
        // Only the newest entry per file matters; earlier ones are
        // superseded within the same window.
        let mut latest: BTreeMap<&str, &RemoteChange> = BTreeMap::new();
        for change in changes {
            let slot = latest.entry(change.plain_id.as_str()).or_insert(change);
            if change.entry.timestamp >= slot.entry.timestamp {
                *slot = change;
            }
        }

        for (plain_id, change) in latest {
            if conflicts.contains(plain_id) {
                continue;
            }
            match self.apply_remote_change(graph_name, change, saved) {
                Ok(()) => {
                    debug!(file = %plain_id, operation = %change.entry.operation, "applied remote change");
                    report.downloaded += 1;
                }
                Err(err) => {
                    error!(file = %plain_id, error = %err, "failed to apply remote change");
                    report.skipped += 1;
                }
            }
        }
    }

    fn apply_remote_change(
        &self,
        graph_name: &str,
        change: &RemoteChange,
        saved: &mut Graph,
    ) -> SyncResult<()> {
        match change.entry.operation {
            Operation::Create | Operation::Modify => {
                let content = self.remote.content(graph_name, &change.entry.file_id)?;
                let content = match self.cipher {
                    Some(cipher) => cipher.decrypt(&content)?,
                    None => content,
                };

                let path = graph::store_file(&self.graph_path, &change.plain_id, &content)?;
                // Track the written file's own mtime so the next scan does
                // not see the download as a fresh local change.
                let last_change = std::fs::metadata(&path)
                    .and_then(|meta| meta.modified())
                    .map(DateTime::<Utc>::from)
                    .unwrap_or(change.entry.timestamp);

                saved.add_or_update(File {
                    id: change.plain_id.clone(),
                    path,
                    last_change,
                });
            }
            Operation::Delete => {
                graph::remove_file(&self.graph_path, &change.plain_id)?;
                saved.remove(&change.plain_id);
            }
        }
        Ok(())
    }

    fn upload_phase(
        &self,
        graph_name: &str,
        transaction_id: &str,
        diff: &CompareResult,
        conflicts: &BTreeSet<String>,
        saved: &mut Graph,
        report: &mut CycleReport,
    ) {
        let outgoing = diff
            .created
            .iter()
            .map(|f| (f, Operation::Create))
            .chain(diff.changed.iter().map(|f| (f, Operation::Modify)));

        for (file, operation) in outgoing {
            if conflicts.contains(&file.id) {
                continue;
            }
            match self.push_file(graph_name, transaction_id, operation, file) {
                Ok(()) => {
                    debug!(file = %file.id, operation = %operation, "uploaded");
                    saved.add_or_update(file.clone());
                    report.uploaded += 1;
                }
                Err(err) => {
                    error!(file = %file.id, error = %err, "upload failed");
                    report.skipped += 1;
                }
            }
        }

        for file in &diff.deleted {
            if conflicts.contains(&file.id) {
                continue;
            }
            match self.push_delete(graph_name, transaction_id, file) {
                Ok(()) => {
                    debug!(file = %file.id, "deletion pushed");
                    saved.remove(&file.id);
                    report.uploaded += 1;
                }
                Err(err) => {
                    error!(file = %file.id, error = %err, "deletion failed");
                    report.skipped += 1;
                }
            }
        }
    }

    fn push_file(
        &self,
        graph_name: &str,
        transaction_id: &str,
        operation: Operation,
        file: &File,
    ) -> SyncResult<()> {
        let content = std::fs::read(&file.path).map_err(|err| SyncError::fs(&file.path, err))?;

        let (wire_id, payload) = match self.cipher {
            Some(cipher) => (cipher.encrypt_id(&file.id)?, cipher.encrypt(&content)?),
            None => (file.id.clone(), content),
        };

        self.remote.upload(
            graph_name,
            transaction_id,
            operation,
            &wire_id,
            file.last_change,
            payload,
        )
    }

    fn push_delete(
        &self,
        graph_name: &str,
        transaction_id: &str,
        file: &File,
    ) -> SyncResult<()> {
        let wire_id = match self.cipher {
            Some(cipher) => cipher.encrypt_id(&file.id)?,
            None => file.id.clone(),
        };

        self.remote
            .delete(graph_name, transaction_id, &wire_id, file.last_change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;
    use chrono::TimeZone;
    use std::path::Path;

    struct Fixture {
        _dir: tempfile::TempDir,
        graph_path: PathBuf,
        snapshots: SnapshotStore,
        remote: MemoryRemote,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let graph_path = dir.path().join("notes");
            std::fs::create_dir_all(&graph_path).unwrap();
            let snapshots = SnapshotStore::new(dir.path().join("state"));
            Self {
                _dir: dir,
                graph_path,
                snapshots,
                remote: MemoryRemote::new(),
            }
        }

        fn syncer(&self) -> GraphSyncer<'_, MemoryRemote> {
            GraphSyncer::new(&self.graph_path, &self.remote, &self.snapshots, None)
        }

        fn write(&self, rel: &str, content: &[u8]) -> PathBuf {
            let path = self.graph_path.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, content).unwrap();
            path
        }

        /// Saves a snapshot that matches the current on-disk state, with
        /// last_sync set to now, so the next cycle sees no local changes.
        fn settle(&self) {
            let mut graph = graph::scan(&self.graph_path).unwrap();
            graph.last_sync = Utc::now();
            self.snapshots.save(&graph).unwrap();
        }
    }

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn first_cycle_uploads_everything_as_created() {
        let fx = Fixture::new();
        fx.write("index.md", b"index");
        fx.write("pages/deep.md", b"deep");

        let report = fx.syncer().sync_cycle().unwrap();

        assert_eq!(report.uploaded, 2);
        assert_eq!(report.downloaded, 0);
        let uploads = fx.remote.uploads();
        assert_eq!(uploads.len(), 2);
        assert!(uploads.iter().all(|u| u.operation == Operation::Create));
        assert!(uploads.iter().any(|u| u.file_id == "pages___deep.md"));

        // snapshot now covers both files
        let saved = fx.snapshots.load("notes").unwrap().unwrap();
        assert_eq!(saved.files.len(), 2);

        // uploads share the cycle's transaction id
        assert_eq!(uploads[0].transaction_id, uploads[1].transaction_id);
    }

    #[test]
    fn modified_file_is_uploaded_as_modify() {
        let fx = Fixture::new();
        let path = fx.write("a.md", b"v1");
        fx.settle();

        // pretend the snapshot is older than the file on disk
        let mut saved = fx.snapshots.load("notes").unwrap().unwrap();
        saved.add_or_update(File {
            id: "a.md".into(),
            path,
            last_change: at(1_000),
        });
        fx.snapshots.save(&saved).unwrap();

        let report = fx.syncer().sync_cycle().unwrap();
        assert_eq!(report.uploaded, 1);
        assert_eq!(fx.remote.uploads()[0].operation, Operation::Modify);
    }

    #[test]
    fn locally_deleted_file_is_pushed_as_delete() {
        let fx = Fixture::new();
        let path = fx.write("gone.md", b"bye");
        fx.settle();
        std::fs::remove_file(path).unwrap();

        let report = fx.syncer().sync_cycle().unwrap();

        assert_eq!(report.uploaded, 1);
        let deletes = fx.remote.deletes();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].file_id, "gone.md");

        let saved = fx.snapshots.load("notes").unwrap().unwrap();
        assert!(saved.file("gone.md").is_none());
    }

    #[test]
    fn remote_create_is_downloaded() {
        let fx = Fixture::new();
        fx.settle();

        fx.remote.push_change(ChangeLogEntry::new(
            "notes",
            "pages___new.md",
            Utc::now() + chrono::Duration::seconds(1),
            "tx-remote",
            Operation::Create,
        ));
        fx.remote.set_content("pages___new.md", b"from remote".to_vec());

        let report = fx.syncer().sync_cycle().unwrap();

        assert_eq!(report.downloaded, 1);
        let local = fx.graph_path.join("pages").join("new.md");
        assert_eq!(std::fs::read(local).unwrap(), b"from remote");

        let saved = fx.snapshots.load("notes").unwrap().unwrap();
        assert!(saved.file("pages___new.md").is_some());
    }

    #[test]
    fn remote_delete_removes_local_file() {
        let fx = Fixture::new();
        let path = fx.write("old.md", b"old");
        fx.settle();

        fx.remote.push_change(ChangeLogEntry::new(
            "notes",
            "old.md",
            Utc::now() + chrono::Duration::seconds(1),
            "tx-remote",
            Operation::Delete,
        ));

        let report = fx.syncer().sync_cycle().unwrap();

        assert_eq!(report.downloaded, 1);
        assert!(!path.exists());
        let saved = fx.snapshots.load("notes").unwrap().unwrap();
        assert!(saved.file("old.md").is_none());
    }

    #[test]
    fn only_newest_remote_change_per_file_is_applied() {
        let fx = Fixture::new();
        fx.settle();

        let base = Utc::now() + chrono::Duration::seconds(1);
        fx.remote.push_change(ChangeLogEntry::new(
            "notes",
            "a.md",
            base,
            "tx",
            Operation::Create,
        ));
        fx.remote.push_change(ChangeLogEntry::new(
            "notes",
            "a.md",
            base + chrono::Duration::seconds(1),
            "tx",
            Operation::Delete,
        ));

        let report = fx.syncer().sync_cycle().unwrap();

        // only the delete ran; no content fetch was needed
        assert_eq!(report.downloaded, 1);
        assert_eq!(report.skipped, 0);
        assert!(!fx.graph_path.join("a.md").exists());
    }

    #[test]
    fn conflicting_file_is_skipped_in_both_directions() {
        let fx = Fixture::new();
        let path = fx.write("both.md", b"local version");
        fx.settle();

        // make it look locally modified
        let mut saved = fx.snapshots.load("notes").unwrap().unwrap();
        saved.add_or_update(File {
            id: "both.md".into(),
            path: path.clone(),
            last_change: at(1_000),
        });
        fx.snapshots.save(&saved).unwrap();

        // and remotely modified
        fx.remote.push_change(ChangeLogEntry::new(
            "notes",
            "both.md",
            Utc::now() + chrono::Duration::seconds(1),
            "tx-remote",
            Operation::Modify,
        ));
        fx.remote.set_content("both.md", b"remote version".to_vec());

        let report = fx.syncer().sync_cycle().unwrap();

        assert_eq!(report.conflicts, vec!["both.md".to_string()]);
        assert_eq!(report.downloaded, 0);
        assert!(fx.remote.uploads().is_empty());
        // local content untouched
        assert_eq!(std::fs::read(&path).unwrap(), b"local version");

        // snapshot entry unchanged, so the next cycle sees it again
        let saved = fx.snapshots.load("notes").unwrap().unwrap();
        assert_eq!(saved.file("both.md").unwrap().last_change, at(1_000));
    }

    #[test]
    fn fetch_failure_aborts_cycle_without_touching_snapshot() {
        let fx = Fixture::new();
        fx.write("a.md", b"content");
        fx.remote.set_unreachable(true);

        assert!(fx.syncer().sync_cycle().is_err());
        assert!(fx.snapshots.load("notes").unwrap().is_none());
        assert!(fx.remote.uploads().is_empty());
    }

    #[test]
    fn missing_remote_content_skips_file_but_continues() {
        let fx = Fixture::new();
        fx.settle();

        let base = Utc::now() + chrono::Duration::seconds(1);
        fx.remote.push_change(ChangeLogEntry::new(
            "notes",
            "broken.md",
            base,
            "tx",
            Operation::Create,
        ));
        fx.remote.push_change(ChangeLogEntry::new(
            "notes",
            "fine.md",
            base,
            "tx",
            Operation::Create,
        ));
        fx.remote.set_content("fine.md", b"ok".to_vec());

        let report = fx.syncer().sync_cycle().unwrap();

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.skipped, 1);
        assert!(fx.graph_path.join("fine.md").exists());
        assert!(!fx.graph_path.join("broken.md").exists());

        // the broken file never made it into the snapshot, so it retries
        let saved = fx.snapshots.load("notes").unwrap().unwrap();
        assert!(saved.file("broken.md").is_none());
    }

    #[test]
    fn encryption_hides_ids_and_content_on_the_wire() {
        let fx = Fixture::new();
        fx.write("secret.md", b"plaintext body");

        let cipher = ContentCipher::from_passphrase("passphrase");
        let syncer =
            GraphSyncer::new(&fx.graph_path, &fx.remote, &fx.snapshots, Some(&cipher));
        let report = syncer.sync_cycle().unwrap();
        assert_eq!(report.uploaded, 1);

        let upload = &fx.remote.uploads()[0];
        assert_ne!(upload.file_id, "secret.md");
        assert_eq!(cipher.decrypt_id(&upload.file_id).unwrap(), "secret.md");
        assert_ne!(upload.content, b"plaintext body");
        assert_eq!(cipher.decrypt(&upload.content).unwrap(), b"plaintext body");

        // snapshot keeps the plaintext id
        let saved = fx.snapshots.load("notes").unwrap().unwrap();
        assert!(saved.file("secret.md").is_some());
    }

    #[test]
    fn encrypted_remote_change_is_decrypted_before_apply() {
        let fx = Fixture::new();
        fx.settle();

        let cipher = ContentCipher::from_passphrase("passphrase");
        let wire_id = cipher.encrypt_id("pages___enc.md").unwrap();
        fx.remote.push_change(ChangeLogEntry::new(
            "notes",
            wire_id.clone(),
            Utc::now() + chrono::Duration::seconds(1),
            "tx",
            Operation::Create,
        ));
        fx.remote
            .set_content(wire_id, cipher.encrypt(b"enc body").unwrap());

        let syncer =
            GraphSyncer::new(&fx.graph_path, &fx.remote, &fx.snapshots, Some(&cipher));
        let report = syncer.sync_cycle().unwrap();

        assert_eq!(report.downloaded, 1);
        let written = fx.graph_path.join("pages").join("enc.md");
        assert_eq!(std::fs::read(written).unwrap(), b"enc body");
    }

    #[test]
    fn undecryptable_remote_id_is_dropped_not_fatal() {
        let fx = Fixture::new();
        fx.settle();

        let cipher = ContentCipher::from_passphrase("passphrase");
        fx.remote.push_change(ChangeLogEntry::new(
            "notes",
            "definitely-not-hex!",
            Utc::now() + chrono::Duration::seconds(1),
            "tx",
            Operation::Create,
        ));

        let syncer =
            GraphSyncer::new(&fx.graph_path, &fx.remote, &fx.snapshots, Some(&cipher));
        let report = syncer.sync_cycle().unwrap();
        assert_eq!(report.downloaded, 0);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn graph_name_comes_from_directory() {
        let fx = Fixture::new();
        fx.settle();
        let report = fx.syncer().sync_cycle().unwrap();
        assert_eq!(report.graph, "notes");
        assert!(Path::new(&fx.graph_path).ends_with("notes"));
    }
}
