//! File-identity mapping.
//!
//! File ids come from clients and may be arbitrarily long or encrypted,
//! so they cannot be used as filesystem names directly. Each id gets a
//! generated UUID name on first reference; processing a delete removes
//! the row, so a later re-create of the same id gets a fresh name.

use crate::error::{ServerError, ServerResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Maps file ids to filesystem-safe generated names.
pub struct FileMappings {
    map: RwLock<HashMap<String, String>>,
    path: Option<PathBuf>,
}

impl FileMappings {
    /// Creates a mapping table with no backing file. Used by tests.
    pub fn in_memory() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            path: None,
        }
    }

    /// Opens a mapping table backed by a JSON file.
    pub fn open(path: impl Into<PathBuf>) -> ServerResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| ServerError::io(parent, err))?;
        }

        let map = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data).map_err(|err| {
                ServerError::storage(format!("corrupt mapping table {}: {err}", path.display()))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(ServerError::io(path, err)),
        };

        Ok(Self {
            map: RwLock::new(map),
            path: Some(path),
        })
    }

    /// Looks up the generated name for a file id.
    pub fn resolve(&self, file_id: &str) -> Option<String> {
        self.map.read().get(file_id).cloned()
    }

    /// Returns the generated name for a file id, creating one on first
    /// reference.
    pub fn resolve_or_create(&self, file_id: &str) -> ServerResult<String> {
        let mut map = self.map.write();
        if let Some(name) = map.get(file_id) {
            return Ok(name.clone());
        }

        let name = Uuid::new_v4().to_string();
        map.insert(file_id.to_string(), name.clone());
        self.persist(&map)?;
        Ok(name)
    }

    /// Removes the mapping for a file id, if any.
    pub fn remove(&self, file_id: &str) -> ServerResult<()> {
        let mut map = self.map.write();
        if map.remove(file_id).is_some() {
            self.persist(&map)?;
        }
        Ok(())
    }

    /// Number of mapped ids.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Returns true if no ids are mapped.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    fn persist(&self, map: &HashMap<String, String>) -> ServerResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let data = serde_json::to_string(map)
            .map_err(|err| ServerError::storage(format!("cannot serialize mappings: {err}")))?;
        std::fs::write(path, data).map_err(|err| ServerError::io(path, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_lazily_and_stable() {
        let mappings = FileMappings::in_memory();
        assert!(mappings.resolve("a.md").is_none());

        let first = mappings.resolve_or_create("a.md").unwrap();
        let second = mappings.resolve_or_create("a.md").unwrap();
        assert_eq!(first, second);
        assert_eq!(mappings.resolve("a.md").as_deref(), Some(first.as_str()));
    }

    #[test]
    fn generated_names_are_distinct() {
        let mappings = FileMappings::in_memory();
        let a = mappings.resolve_or_create("a.md").unwrap();
        let b = mappings.resolve_or_create("b.md").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn recreate_after_remove_gets_fresh_name() {
        let mappings = FileMappings::in_memory();
        let first = mappings.resolve_or_create("a.md").unwrap();

        mappings.remove("a.md").unwrap();
        assert!(mappings.resolve("a.md").is_none());

        let second = mappings.resolve_or_create("a.md").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn remove_of_unknown_id_is_fine() {
        let mappings = FileMappings::in_memory();
        mappings.remove("never-seen").unwrap();
        assert!(mappings.is_empty());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("mappings.json");

        let name = {
            let mappings = FileMappings::open(&path).unwrap();
            mappings.resolve_or_create("pages___a.md").unwrap()
        };

        let reopened = FileMappings::open(&path).unwrap();
        assert_eq!(reopened.resolve("pages___a.md"), Some(name));
        assert_eq!(reopened.len(), 1);
    }
}
