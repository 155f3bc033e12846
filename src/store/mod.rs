//! Destination store for normalized locations.
//!
//! The pipeline only talks to the store through two traits:
//!
//! - [`Store`] prepares the destination schema and opens one dedicated
//!   [`BulkWriter`] per worker. Connections are never shared between workers.
//! - [`BulkWriter`] persists a whole [`Batch`] atomically and reports how many
//!   records it accepted.
//!
//! [`postgres`] provides the PostGIS implementation used by the binary.

pub mod columns;
pub mod pg_config;
pub mod postgres;
pub mod schema;

use std::future::Future;
use thiserror::Error;

use crate::ingest::Batch;

pub use postgres::{PostgresStore, PostgresWriter};

/// Failure to reach or prepare the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid connection settings: {0}")]
    InvalidOptions(String),
    #[error("connection failed: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a single batch write. The batch is dropped, the worker continues.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("batch rejected: {0}")]
    Rejected(String),
}

/// Result of one committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Records submitted after writer-side validation.
    pub accepted: u64,
    /// Accepted records that were new; duplicates are skipped silently.
    pub inserted: u64,
    /// Records excluded by validation (empty name, coordinates out of range).
    pub rejected: u64,
}

/// One worker's exclusive handle for bulk writes.
pub trait BulkWriter: Send + 'static {
    /// Persist every valid record of `batch`, all or nothing.
    fn write(&mut self, batch: &Batch) -> impl Future<Output = Result<WriteOutcome, WriteError>> + Send;

    /// Release the underlying connection.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Destination that can be prepared once and written by many workers.
pub trait Store: Send + Sync + 'static {
    type Writer: BulkWriter;

    /// Create the destination structures if missing. Safe to call repeatedly.
    fn ensure_schema(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Open a dedicated writer for `worker_id`.
    fn connect_writer(
        &self,
        worker_id: usize,
    ) -> impl Future<Output = Result<Self::Writer, StoreError>> + Send;
}
