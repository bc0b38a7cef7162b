//! Request handlers for the sync endpoints.
//!
//! The handlers are framework-independent; the HTTP layer only extracts
//! parameters and maps [`ServerError`] to status codes. All idempotency
//! and validation rules live here.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::ledger::{Appended, ChangeLedger, PageOptions};
use crate::mapping::FileMappings;
use crate::store::{ContentStore, DiskContentStore, MemoryContentStore};
use chrono::{DateTime, TimeZone, Utc};
use logsync_protocol::{ChangeLogEntry, Operation, TransactionSummary};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared state for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// The append-only change ledger.
    pub ledger: ChangeLedger,
    /// File-id to storage-name mapping.
    pub mappings: FileMappings,
    /// Stored file content.
    pub store: Box<dyn ContentStore>,
}

impl HandlerContext {
    /// Opens the persistent state referenced by the configuration.
    pub fn open(config: ServerConfig) -> ServerResult<Self> {
        let ledger = ChangeLedger::open(config.ledger_path())?;
        let mappings = FileMappings::open(config.mappings_path())?;
        let store = Box::new(DiskContentStore::new(config.files_dir.clone()));
        Ok(Self {
            config,
            ledger,
            mappings,
            store,
        })
    }

    /// Builds a fully in-memory context for tests.
    pub fn in_memory(config: ServerConfig) -> Self {
        Self {
            config,
            ledger: ChangeLedger::in_memory(),
            mappings: FileMappings::in_memory(),
            store: Box::new(MemoryContentStore::new()),
        }
    }
}

/// An upload request as extracted from the multipart body.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// File id, taken from the file part's filename.
    pub file_id: String,
    /// Raw content bytes.
    pub content: Vec<u8>,
    /// Transaction id from the `ta-id` field.
    pub transaction_id: String,
    /// Operation code from the `operation` field.
    pub operation: String,
    /// RFC3339 timestamp from the `modified-date` field, when present.
    pub modified_date: Option<String>,
}

/// Handler for the sync endpoints.
#[derive(Clone)]
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Returns the shared context.
    pub fn context(&self) -> &HandlerContext {
        &self.context
    }

    /// Handles an upload of file content under a Create or Modify
    /// operation.
    ///
    /// Resubmitting an identical (graph, file id, timestamp) is an
    /// idempotent success: the stored bytes are left alone and no second
    /// ledger row appears.
    pub fn upload(&self, graph: &str, request: UploadRequest) -> ServerResult<()> {
        if request.transaction_id.is_empty() {
            return Err(ServerError::validation("missing ta-id"));
        }
        let operation = Operation::from_code(&request.operation)
            .filter(Operation::allowed_for_upload)
            .ok_or_else(|| {
                ServerError::validation(format!(
                    "invalid operation {:?}, allowed values: C, M",
                    request.operation
                ))
            })?;
        let timestamp = parse_modified_date(request.modified_date.as_deref())?;

        if self.context.ledger.contains(graph, &request.file_id, timestamp) {
            info!(graph, file = %request.file_id, "entry already exists, nothing to do");
            return Ok(());
        }

        let name = self.context.mappings.resolve_or_create(&request.file_id)?;
        // Bytes land before the ledger entry. A crash in between leaves an
        // orphan blob; the retried upload overwrites it.
        self.context.store.store(graph, &name, &request.content)?;

        let entry = ChangeLogEntry::new(
            graph,
            request.file_id.clone(),
            timestamp,
            request.transaction_id,
            operation,
        );
        match self.context.ledger.append(entry)? {
            Appended::Inserted => {
                debug!(graph, file = %request.file_id, %operation, "change recorded");
            }
            Appended::Duplicate => {
                info!(graph, file = %request.file_id, "lost append race, entry already recorded");
            }
        }
        Ok(())
    }

    /// Handles a file deletion.
    ///
    /// The mapping is resolved-or-created even for ids never uploaded, so
    /// a delete always yields a ledger entry; a missing physical file is
    /// tolerated. Duplicate resubmission is an idempotent success.
    pub fn delete(
        &self,
        graph: &str,
        file_id: &str,
        transaction_id: &str,
        modified_millis: Option<i64>,
    ) -> ServerResult<()> {
        if transaction_id.is_empty() {
            return Err(ServerError::validation("missing ta_id"));
        }
        let timestamp = match modified_millis {
            Some(millis) => Utc
                .timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| ServerError::validation("invalid modified_date"))?,
            None => Utc::now(),
        };

        if self.context.ledger.contains(graph, file_id, timestamp) {
            info!(graph, file = %file_id, "entry already exists, nothing to do");
            return Ok(());
        }

        let name = self.context.mappings.resolve_or_create(file_id)?;
        match self.context.store.remove(graph, &name) {
            Ok(()) => {}
            // never uploaded, or bytes were never finalized
            Err(err) if err.is_not_found() => {
                debug!(graph, file = %file_id, "no stored content to remove");
            }
            Err(err) => return Err(err),
        }
        self.context.mappings.remove(file_id)?;

        let entry = ChangeLogEntry::new(
            graph,
            file_id,
            timestamp,
            transaction_id,
            Operation::Delete,
        );
        self.context.ledger.append(entry)?;
        debug!(graph, file = %file_id, "deletion recorded");
        Ok(())
    }

    /// Returns the stored content for a file id.
    ///
    /// A mapping without finalized bytes behind it reads as NotFound.
    pub fn content(&self, graph: &str, file_id: &str) -> ServerResult<Vec<u8>> {
        let name = self
            .context
            .mappings
            .resolve(file_id)
            .ok_or_else(|| ServerError::not_found(file_id.to_string()))?;
        self.context.store.content(graph, &name)
    }

    /// Returns the changes for a graph strictly after `since` (epoch
    /// millis), ascending.
    pub fn changes(&self, graph: &str, since_millis: i64) -> Vec<ChangeLogEntry> {
        self.context.ledger.changes_since(graph, since_millis)
    }

    /// Returns transaction summaries for the operator endpoints.
    pub fn transactions(&self, page: Option<i64>, size: Option<i64>) -> Vec<TransactionSummary> {
        self.context.ledger.transactions(PageOptions::new(page, size))
    }

    /// Returns the changes recorded under one transaction.
    pub fn transaction_changes(
        &self,
        transaction_id: &str,
        page: Option<i64>,
        size: Option<i64>,
    ) -> Vec<ChangeLogEntry> {
        self.context
            .ledger
            .changes_in_transaction(transaction_id, PageOptions::new(page, size))
    }
}

fn parse_modified_date(value: Option<&str>) -> ServerResult<DateTime<Utc>> {
    match value {
        None | Some("") => Ok(Utc::now()),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|err| ServerError::validation(format!("invalid modified-date: {err}"))),
    }
}
