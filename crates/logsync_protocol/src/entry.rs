//! Change-log records.

use crate::operation::Operation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One record of the append-only change log.
///
/// The triple (graph_name, file_id, timestamp) identifies an entry;
/// resubmitting the same triple is an idempotent no-op on the server.
/// Identity compares timestamps at microsecond precision, finer than the
/// millisecond resolution of the `since` query parameter, so the
/// different timestamp encodings of the upload and delete endpoints stay
/// distinguishable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Name of the graph this change belongs to.
    pub graph_name: String,
    /// Logical file id. Opaque to the server; may be an encrypted blob.
    pub file_id: String,
    /// Modification time reported by the client.
    pub timestamp: DateTime<Utc>,
    /// Transaction the change was submitted under.
    pub transaction_id: String,
    /// The change kind.
    pub operation: Operation,
}

impl ChangeLogEntry {
    /// Creates a new entry.
    pub fn new(
        graph_name: impl Into<String>,
        file_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        transaction_id: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Self {
            graph_name: graph_name.into(),
            file_id: file_id.into(),
            timestamp,
            transaction_id: transaction_id.into(),
            operation,
        }
    }

    /// Returns the identity key used for duplicate detection.
    pub fn dedup_key(&self) -> (String, String, i64) {
        (
            self.graph_name.clone(),
            self.file_id.clone(),
            self.timestamp.timestamp_micros(),
        )
    }
}

/// Aggregate view of one transaction, for the operator endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    /// Transaction id.
    pub id: String,
    /// Timestamp of the earliest entry in the transaction.
    pub from: DateTime<Utc>,
    /// Timestamp of the latest entry in the transaction.
    pub to: DateTime<Utc>,
    /// Number of entries in the transaction.
    pub count: usize,
}
