//! # Logsync Protocol
//!
//! Wire protocol types shared by the logsync client and server.
//!
//! This crate provides:
//! - [`Operation`], the change kind carried by every ledger entry
//! - [`ChangeLogEntry`], one append-only change-log record
//! - [`TransactionSummary`], the operator-facing transaction aggregate
//! - [`headers`], HTTP header names used by both sides
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entry;
mod operation;

pub use entry::{ChangeLogEntry, TransactionSummary};
pub use operation::Operation;

/// HTTP header names shared between client and server.
pub mod headers {
    /// Static API token, checked when the server has one configured.
    pub const API_TOKEN: &str = "X-Api-Token";
    /// Transaction correlation header, logging only.
    pub const TRANSACTION_ID: &str = "X-Transaction-Id";
    /// Request correlation header, logging only.
    pub const REQUEST_ID: &str = "X-Request-Id";
}
