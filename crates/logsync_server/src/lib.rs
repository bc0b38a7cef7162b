//! # Logsync Server
//!
//! The remote half of logsync: an HTTP server keeping an append-only
//! change ledger per graph, a mapping from client file ids to
//! filesystem-safe storage names, and the stored file content itself.
//!
//! This crate provides:
//! - [`ChangeLedger`], the append-only, duplicate-safe change log
//! - [`FileMappings`], the lazy file-id to storage-name mapping
//! - [`ContentStore`], a narrow capability for stored bytes
//! - [`RequestHandler`], the framework-independent endpoint semantics
//! - [`server::router`] and [`server::serve`], the axum HTTP layer
//!
//! # Consistency
//!
//! The ledger enforces uniqueness on (graph, file id, timestamp); a
//! resubmitted change is acknowledged without a second row, which is what
//! makes client retries safe. File bytes are written before the ledger
//! entry, so a crash in between leaves an orphan blob that the retried
//! upload overwrites; content lookups treat the half-finished state as
//! NotFound.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handler;
pub mod ledger;
pub mod mapping;
pub mod server;
pub mod store;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler, UploadRequest};
pub use ledger::{Appended, ChangeLedger, PageOptions};
pub use mapping::FileMappings;
pub use store::{ContentStore, DiskContentStore, MemoryContentStore};
