//! Conflict detection between remote and local changes.

use crate::compare::CompareResult;
use std::collections::BTreeSet;
use tracing::warn;

/// Returns the file ids changed both remotely and locally since the last
/// sync.
///
/// A conflicted id is excluded from both transfer directions for the
/// current cycle and picked up again on the next one; nothing is ever
/// merged automatically. Ids are plaintext on both sides; each id appears
/// at most once no matter how many local sets it matches.
pub fn find_conflicts(remote_ids: &[String], local: &CompareResult) -> BTreeSet<String> {
    if remote_ids.is_empty() || local.no_changes() {
        return BTreeSet::new();
    }

    let local_ids: BTreeSet<&str> = local
        .created
        .iter()
        .chain(local.changed.iter())
        .chain(local.deleted.iter())
        .map(|f| f.id.as_str())
        .collect();

    let mut conflicts = BTreeSet::new();
    for id in remote_ids {
        if local_ids.contains(id.as_str()) && conflicts.insert(id.clone()) {
            warn!(file = %id, "file changed locally and remotely, skipping this cycle");
        }
    }

    conflicts
}
