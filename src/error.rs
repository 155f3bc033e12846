use std::path::PathBuf;
use thiserror::Error;
use tokio::task::JoinError;

use crate::store::StoreError;

/// Failures that abort a whole ingestion run.
///
/// Per-line decode failures and per-batch write failures are recovered inside
/// the pipeline and never surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to open input {path}: {source}")]
    OpenInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read input: {0}")]
    Read(#[source] std::io::Error),
    #[error("schema setup failed: {0}")]
    Schema(#[source] StoreError),
    #[error("worker {worker_id} could not connect after {attempts} attempt(s): {source}")]
    WorkerConnect {
        worker_id: usize,
        attempts: u32,
        #[source]
        source: StoreError,
    },
    #[error("batch queue closed while input remained; all workers have stopped")]
    QueueClosed,
    #[error("producer task failed: {0}")]
    Producer(#[source] JoinError),
    #[error("worker {worker_id} task failed: {source}")]
    Worker {
        worker_id: usize,
        #[source]
        source: JoinError,
    },
}
