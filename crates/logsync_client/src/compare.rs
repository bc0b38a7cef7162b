//! Graph snapshot diffing.

use crate::graph::{File, Graph};
use std::collections::HashMap;

/// The difference between two graph snapshots.
///
/// Derived, never persisted. The three sets are disjoint: a file id
/// appears in at most one of them.
#[derive(Debug, Clone, Default)]
pub struct CompareResult {
    /// Files present only in the new graph.
    pub created: Vec<File>,
    /// Files present in both graphs with a strictly later change time.
    pub changed: Vec<File>,
    /// Files present only in the old graph.
    pub deleted: Vec<File>,
}

impl CompareResult {
    /// Returns true if the graphs were identical.
    pub fn no_changes(&self) -> bool {
        self.created.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }

    /// Total number of differing files.
    pub fn len(&self) -> usize {
        self.created.len() + self.changed.len() + self.deleted.len()
    }

    /// Returns true if there are no differing files.
    pub fn is_empty(&self) -> bool {
        self.no_changes()
    }
}

/// Compares two snapshots of the same graph.
///
/// A file counts as changed only when its modification time is strictly
/// after the old one; an equal timestamp is not a change.
pub fn compare(old: &Graph, new: &Graph) -> CompareResult {
    let old_by_id: HashMap<&str, &File> =
        old.files.iter().map(|f| (f.id.as_str(), f)).collect();
    let new_by_id: HashMap<&str, &File> =
        new.files.iter().map(|f| (f.id.as_str(), f)).collect();

    let mut result = CompareResult::default();

    for file in &new.files {
        match old_by_id.get(file.id.as_str()) {
            None => result.created.push(file.clone()),
            Some(previous) if file.last_change > previous.last_change => {
                result.changed.push(file.clone());
            }
            Some(_) => {}
        }
    }

    for file in &old.files {
        if !new_by_id.contains_key(file.id.as_str()) {
            result.deleted.push(file.clone());
        }
    }

    result
}
