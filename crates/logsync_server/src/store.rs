//! Stored file content.

use crate::error::{ServerError, ServerResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;

/// Capability for storing raw file content under a generated name.
///
/// Deliberately narrow: exactly the three operations the sync endpoints
/// need, so tests can substitute an in-memory fake.
pub trait ContentStore: Send + Sync {
    /// Writes content for a graph under a generated file name,
    /// overwriting any previous bytes.
    fn store(&self, graph: &str, name: &str, content: &[u8]) -> ServerResult<()>;

    /// Removes stored content. Fails with NotFound when absent.
    fn remove(&self, graph: &str, name: &str) -> ServerResult<()>;

    /// Reads stored content. Fails with NotFound when absent.
    fn content(&self, graph: &str, name: &str) -> ServerResult<Vec<u8>>;
}

/// Content store over a base directory, one subdirectory per graph.
pub struct DiskContentStore {
    base: PathBuf,
}

impl DiskContentStore {
    /// Creates a store rooted at `base`. Directories appear on demand.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn file_path(&self, graph: &str, name: &str) -> PathBuf {
        self.base.join(graph).join(name)
    }
}

impl ContentStore for DiskContentStore {
    fn store(&self, graph: &str, name: &str, content: &[u8]) -> ServerResult<()> {
        let dir = self.base.join(graph);
        std::fs::create_dir_all(&dir).map_err(|err| ServerError::io(&dir, err))?;

        let path = self.file_path(graph, name);
        std::fs::write(&path, content).map_err(|err| ServerError::io(path, err))
    }

    fn remove(&self, graph: &str, name: &str) -> ServerResult<()> {
        let path = self.file_path(graph, name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ServerError::not_found(format!("{graph}/{name}")))
            }
            Err(err) => Err(ServerError::io(path, err)),
        }
    }

    fn content(&self, graph: &str, name: &str) -> ServerResult<Vec<u8>> {
        let path = self.file_path(graph, name);
        match std::fs::read(&path) {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ServerError::not_found(format!("{graph}/{name}")))
            }
            Err(err) => Err(ServerError::io(path, err)),
        }
    }
}

/// In-memory content store for tests.
#[derive(Default)]
pub struct MemoryContentStore {
    files: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryContentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl ContentStore for MemoryContentStore {
    fn store(&self, graph: &str, name: &str, content: &[u8]) -> ServerResult<()> {
        self.files
            .write()
            .insert((graph.to_string(), name.to_string()), content.to_vec());
        Ok(())
    }

    fn remove(&self, graph: &str, name: &str) -> ServerResult<()> {
        self.files
            .write()
            .remove(&(graph.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| ServerError::not_found(format!("{graph}/{name}")))
    }

    fn content(&self, graph: &str, name: &str) -> ServerResult<Vec<u8>> {
        self.files
            .read()
            .get(&(graph.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ServerError::not_found(format!("{graph}/{name}")))
    }
}
