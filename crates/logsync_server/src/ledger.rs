//! The append-only change ledger.
//!
//! Entries live in memory in commit order, with a key set over
//! (graph_name, file_id, timestamp) enforcing uniqueness. Both structures
//! sit behind one lock, so the check-then-insert in
//! [`ChangeLedger::append`] is atomic: a second insert of the same key
//! reports [`Appended::Duplicate`] and is treated as idempotent success,
//! never an error.
//!
//! Durability comes from an append-only JSON-lines file replayed on open.

use crate::error::{ServerError, ServerResult};
use logsync_protocol::{ChangeLogEntry, TransactionSummary};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::PathBuf;

/// Outcome of an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    /// The entry was new and is now part of the ledger.
    Inserted,
    /// An entry with the same identity already existed; nothing changed.
    Duplicate,
}

/// Pagination window for the operator queries.
#[derive(Debug, Clone, Copy)]
pub struct PageOptions {
    /// 1-based page number.
    pub page: usize,
    /// Entries per page.
    pub size: usize,
}

impl PageOptions {
    /// Builds page options, falling back to page 1 / size 10 for values
    /// that make no sense.
    pub fn new(page: Option<i64>, size: Option<i64>) -> Self {
        let size = match size {
            Some(s) if s >= 1 => s as usize,
            _ => 10,
        };
        let page = match page {
            Some(p) if p > 1 => p as usize,
            _ => 1,
        };
        Self { page, size }
    }

    fn skip(&self) -> usize {
        (self.page - 1) * self.size
    }
}

impl Default for PageOptions {
    fn default() -> Self {
        Self { page: 1, size: 10 }
    }
}

#[derive(Default)]
struct LedgerState {
    /// Entries in commit order.
    entries: Vec<ChangeLogEntry>,
    /// Identity keys of every entry; the uniqueness constraint.
    keys: HashSet<(String, String, i64)>,
}

/// Append-only store of change-log entries.
pub struct ChangeLedger {
    state: RwLock<LedgerState>,
    path: Option<PathBuf>,
}

impl ChangeLedger {
    /// Creates a ledger with no backing file. Used by tests.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            path: None,
        }
    }

    /// Opens a ledger backed by a JSON-lines file, replaying any existing
    /// entries. The parent directory is created if missing.
    pub fn open(path: impl Into<PathBuf>) -> ServerResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| ServerError::io(parent, err))?;
        }

        let mut state = LedgerState::default();
        match std::fs::read_to_string(&path) {
            Ok(data) => {
                for (number, line) in data.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let entry: ChangeLogEntry = serde_json::from_str(line).map_err(|err| {
                        ServerError::storage(format!(
                            "corrupt ledger line {} in {}: {err}",
                            number + 1,
                            path.display()
                        ))
                    })?;
                    state.keys.insert(entry.dedup_key());
                    state.entries.push(entry);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(ServerError::io(path, err)),
        }

        Ok(Self {
            state: RwLock::new(state),
            path: Some(path),
        })
    }

    /// Appends an entry unless one with the same identity exists.
    pub fn append(&self, entry: ChangeLogEntry) -> ServerResult<Appended> {
        let mut state = self.state.write();

        let key = entry.dedup_key();
        if state.keys.contains(&key) {
            return Ok(Appended::Duplicate);
        }

        if let Some(path) = &self.path {
            let line = serde_json::to_string(&entry)
                .map_err(|err| ServerError::storage(format!("cannot serialize entry: {err}")))?;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| ServerError::io(path, err))?;
            writeln!(file, "{line}").map_err(|err| ServerError::io(path, err))?;
        }

        state.keys.insert(key);
        state.entries.push(entry);
        Ok(Appended::Inserted)
    }

    /// Returns true if an entry with this identity exists.
    pub fn contains(&self, graph: &str, file_id: &str, timestamp: chrono::DateTime<chrono::Utc>) -> bool {
        self.state.read().keys.contains(&(
            graph.to_string(),
            file_id.to_string(),
            timestamp.timestamp_micros(),
        ))
    }

    /// Returns all entries for a graph with a timestamp strictly greater
    /// than `since` (epoch millis), ascending by timestamp.
    pub fn changes_since(&self, graph: &str, since_millis: i64) -> Vec<ChangeLogEntry> {
        let state = self.state.read();
        let mut entries: Vec<ChangeLogEntry> = state
            .entries
            .iter()
            .filter(|e| e.graph_name == graph && e.timestamp.timestamp_millis() > since_millis)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.timestamp);
        entries
    }

    /// Returns transaction summaries, newest first, paged.
    pub fn transactions(&self, page: PageOptions) -> Vec<TransactionSummary> {
        let state = self.state.read();

        let mut by_transaction: BTreeMap<&str, TransactionSummary> = BTreeMap::new();
        for entry in &state.entries {
            by_transaction
                .entry(entry.transaction_id.as_str())
                .and_modify(|summary| {
                    summary.from = summary.from.min(entry.timestamp);
                    summary.to = summary.to.max(entry.timestamp);
                    summary.count += 1;
                })
                .or_insert_with(|| TransactionSummary {
                    id: entry.transaction_id.clone(),
                    from: entry.timestamp,
                    to: entry.timestamp,
                    count: 1,
                });
        }

        let mut summaries: Vec<TransactionSummary> = by_transaction.into_values().collect();
        summaries.sort_by(|a, b| b.to.cmp(&a.to));
        summaries
            .into_iter()
            .skip(page.skip())
            .take(page.size)
            .collect()
    }

    /// Returns the entries of one transaction, newest first, paged.
    pub fn changes_in_transaction(
        &self,
        transaction_id: &str,
        page: PageOptions,
    ) -> Vec<ChangeLogEntry> {
        let state = self.state.read();
        let mut entries: Vec<ChangeLogEntry> = state
            .entries
            .iter()
            .filter(|e| e.transaction_id == transaction_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
            .into_iter()
            .skip(page.skip())
            .take(page.size)
            .collect()
    }

    /// Returns the number of ledger entries.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns true if the ledger has no entries.
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}
