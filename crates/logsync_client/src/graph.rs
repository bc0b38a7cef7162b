//! Graph model and filesystem scanner.
//!
//! A graph is a named directory tree. Every regular file inside it gets a
//! stable logical id derived from its path relative to the graph root, with
//! path components joined by [`ID_SEPARATOR`]. The id is what travels over
//! the wire; the absolute path never leaves the local machine.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Reserved separator joining path components inside a file id.
///
/// Must never appear in a normal file or directory name.
pub const ID_SEPARATOR: &str = "___";

/// Directory names excluded from scans anywhere in the tree.
const SKIP_FOLDERS: &[&str] = &["bak", ".recycle"];

/// A tracked file inside a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    /// Stable logical id, unique within the graph.
    pub id: String,
    /// Absolute local path. Never transmitted.
    pub path: PathBuf,
    /// Last modification time.
    #[serde(rename = "lastChange")]
    pub last_change: DateTime<Utc>,
}

/// A snapshot of one graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Graph name, the root directory's basename.
    pub name: String,
    /// Time of the last completed sync cycle.
    #[serde(rename = "lastSync", default = "unix_epoch")]
    pub last_sync: DateTime<Utc>,
    /// Tracked files.
    pub files: Vec<File>,
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl Graph {
    /// Creates an empty graph with an epoch last-sync marker.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_sync: unix_epoch(),
            files: Vec::new(),
        }
    }

    /// Looks up a file by id.
    pub fn file(&self, id: &str) -> Option<&File> {
        self.files.iter().find(|f| f.id == id)
    }

    /// Inserts a file, replacing any existing entry with the same id.
    pub fn add_or_update(&mut self, file: File) {
        match self.files.iter_mut().find(|f| f.id == file.id) {
            Some(existing) => *existing = file,
            None => self.files.push(file),
        }
    }

    /// Removes the file with the given id, if present.
    pub fn remove(&mut self, id: &str) {
        self.files.retain(|f| f.id != id);
    }
}

/// Builds a file id from a path relative to the graph root.
pub fn id_from_rel_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(ID_SEPARATOR)
}

/// Resolves a file id back into a relative path.
pub fn rel_path_from_id(id: &str) -> PathBuf {
    id.split(ID_SEPARATOR).collect()
}

/// Returns the graph name for a root directory (its basename).
pub fn graph_name(root: &Path) -> SyncResult<String> {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| SyncError::config(format!("graph path {} has no name", root.display())))
}

/// Walks a graph directory into a fresh snapshot.
///
/// The returned graph carries an epoch last-sync marker; only the caller
/// knows when the last cycle completed.
pub fn scan(root: &Path) -> SyncResult<Graph> {
    let name = graph_name(root)?;
    let mut files = Vec::new();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        let skipped = entry.file_type().is_dir()
            && SKIP_FOLDERS
                .iter()
                .any(|skip| entry.file_name().to_string_lossy() == *skip)
            && entry.depth() > 0;
        !skipped
    });

    for entry in walker {
        let entry = entry.map_err(|err| {
            let path = err
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf());
            SyncError::fs(path, err.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| SyncError::config(format!("{} escapes graph root", entry.path().display())))?;
        let metadata = entry
            .metadata()
            .map_err(|err| SyncError::fs(entry.path(), err.into()))?;
        let modified = metadata
            .modified()
            .map_err(|err| SyncError::fs(entry.path(), err))?;

        files.push(File {
            id: id_from_rel_path(rel),
            path: entry.path().to_path_buf(),
            last_change: DateTime::<Utc>::from(modified),
        });
    }

    Ok(Graph {
        name,
        last_sync: unix_epoch(),
        files,
    })
}

/// Writes downloaded content to the local path a file id resolves to,
/// creating intermediate directories as needed. Returns the written path.
pub fn store_file(root: &Path, id: &str, content: &[u8]) -> SyncResult<PathBuf> {
    let path = root.join(rel_path_from_id(id));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| SyncError::fs(parent, err))?;
    }
    std::fs::write(&path, content).map_err(|err| SyncError::fs(&path, err))?;
    Ok(path)
}

/// Removes the local file a file id resolves to.
///
/// A file that is already gone counts as removed.
pub fn remove_file(root: &Path, id: &str) -> SyncResult<()> {
    let path = root.join(rel_path_from_id(id));
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(SyncError::fs(path, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_roundtrip() {
        let rel = Path::new("journals").join("2024").join("notes.md");
        let id = id_from_rel_path(&rel);
        assert_eq!(id, "journals___2024___notes.md");
        assert_eq!(rel_path_from_id(&id), rel);
    }

    #[test]
    fn top_level_id_has_no_separator() {
        let id = id_from_rel_path(Path::new("readme.md"));
        assert_eq!(id, "readme.md");
        assert_eq!(rel_path_from_id(&id), PathBuf::from("readme.md"));
    }

    #[test]
    fn add_or_update_replaces_by_id() {
        let mut graph = Graph::new("test");
        let ts = Utc::now();
        graph.add_or_update(File {
            id: "a.md".into(),
            path: "/g/a.md".into(),
            last_change: ts,
        });
        graph.add_or_update(File {
            id: "a.md".into(),
            path: "/g/a.md".into(),
            last_change: ts + chrono::Duration::seconds(5),
        });

        assert_eq!(graph.files.len(), 1);
        assert_eq!(
            graph.file("a.md").unwrap().last_change,
            ts + chrono::Duration::seconds(5)
        );
    }

    #[test]
    fn remove_is_idempotent() {
        let mut graph = Graph::new("test");
        graph.add_or_update(File {
            id: "a.md".into(),
            path: "/g/a.md".into(),
            last_change: Utc::now(),
        });

        graph.remove("a.md");
        graph.remove("a.md");
        assert!(graph.files.is_empty());
    }

    #[test]
    fn scan_collects_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("notes");
        std::fs::create_dir_all(root.join("journals")).unwrap();
        std::fs::write(root.join("index.md"), b"index").unwrap();
        std::fs::write(root.join("journals").join("day.md"), b"day").unwrap();

        let graph = scan(&root).unwrap();
        assert_eq!(graph.name, "notes");
        assert_eq!(graph.files.len(), 2);
        assert!(graph.file("index.md").is_some());
        assert!(graph.file("journals___day.md").is_some());
    }

    #[test]
    fn scan_skips_excluded_folders() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("notes");
        std::fs::create_dir_all(root.join("bak")).unwrap();
        std::fs::create_dir_all(root.join(".recycle")).unwrap();
        std::fs::write(root.join("bak").join("old.md"), b"old").unwrap();
        std::fs::write(root.join(".recycle").join("gone.md"), b"gone").unwrap();
        std::fs::write(root.join("keep.md"), b"keep").unwrap();

        let graph = scan(&root).unwrap();
        assert_eq!(graph.files.len(), 1);
        assert!(graph.file("keep.md").is_some());
    }

    #[test]
    fn store_and_remove_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let path = store_file(root, "pages___deep___note.md", b"hello").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        assert_eq!(path, root.join("pages").join("deep").join("note.md"));

        remove_file(root, "pages___deep___note.md").unwrap();
        assert!(!path.exists());

        // already gone is fine
        remove_file(root, "pages___deep___note.md").unwrap();
    }

    #[test]
    fn missing_root_fails_scan() {
        let dir = tempfile::tempdir().unwrap();
        let result = scan(&dir.path().join("does-not-exist"));
        assert!(matches!(result, Err(SyncError::Filesystem { .. })));
    }
}
