//! Fixed pool of bulk-write workers.
//!
//! Every worker owns one [`BulkWriter`] for its whole life and loops:
//! pop a batch, write it, account for it, drop it. A `None` from the queue
//! closes the writer and stops the worker for good.
//!
//! All writers are connected before any worker starts, so a run never begins
//! reading input with fewer workers than configured.

use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use super::batch::Batch;
use super::queue::BatchReceiver;
use super::stats::StatsAccumulator;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::store::{BulkWriter, Store};

/// What one worker did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub worker_id: usize,
    pub batches_written: u64,
    pub batches_failed: u64,
}

struct Worker<W> {
    id: usize,
    writer: W,
    receiver: BatchReceiver,
    stats: StatsAccumulator,
}

impl<W: BulkWriter> Worker<W> {
    async fn run(mut self) -> WorkerSummary {
        let mut summary = WorkerSummary {
            worker_id: self.id,
            ..WorkerSummary::default()
        };

        while let Some(batch) = self.receiver.pop().await {
            if self.write(batch).await {
                summary.batches_written += 1;
            } else {
                summary.batches_failed += 1;
            }
        }

        self.writer.close().await;
        log::debug!(
            "worker {}: stopped after {} batch(es), {} failed",
            self.id,
            summary.batches_written,
            summary.batches_failed
        );
        summary
    }

    /// Write one batch; the batch is released either way.
    async fn write(&mut self, batch: Batch) -> bool {
        let started = Instant::now();
        match self.writer.write(&batch).await {
            Ok(outcome) => {
                let elapsed = started.elapsed();
                self.stats.record_batch_written(&outcome, elapsed);
                log::trace!(
                    "worker {}: batch {} wrote {} records in {:?}",
                    self.id,
                    batch.sequence(),
                    outcome.accepted,
                    elapsed
                );
                true
            }
            Err(e) => {
                self.stats.record_batch_failed(batch.len());
                log::warn!(
                    "worker {}: dropping batch {} ({} records): {}",
                    self.id,
                    batch.sequence(),
                    batch.len(),
                    e
                );
                false
            }
        }
    }
}

/// Running workers, joined once the queue is completed.
pub struct WorkerPool {
    handles: Vec<(usize, JoinHandle<WorkerSummary>)>,
}

impl WorkerPool {
    /// Connect `config.workers` writers, then spawn one worker per writer.
    ///
    /// Fails if any writer cannot connect within `config.connect_attempts`;
    /// writers already opened are closed before returning.
    pub async fn start<S: Store>(
        store: &S,
        config: &PipelineConfig,
        receiver: BatchReceiver,
        stats: StatsAccumulator,
    ) -> Result<Self, PipelineError> {
        let mut writers = Vec::with_capacity(config.workers);

        for worker_id in 0..config.workers {
            match connect_with_retry(
                store,
                worker_id,
                config.connect_attempts,
                config.connect_retry_delay,
            )
            .await
            {
                Ok(writer) => writers.push(writer),
                Err(e) => {
                    for writer in writers {
                        writer.close().await;
                    }
                    return Err(e);
                }
            }
        }

        let handles = writers
            .into_iter()
            .enumerate()
            .map(|(id, writer)| {
                let worker = Worker {
                    id,
                    writer,
                    receiver: receiver.clone(),
                    stats: stats.clone(),
                };
                (id, tokio::spawn(worker.run()))
            })
            .collect::<Vec<_>>();

        log::info!("started {} writer worker(s)", handles.len());
        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to stop.
    ///
    /// All workers are awaited even if one of them panicked; the first
    /// failure is returned afterwards.
    pub async fn join(self) -> Result<Vec<WorkerSummary>, PipelineError> {
        let mut summaries = Vec::with_capacity(self.handles.len());
        let mut first_error = None;

        for (worker_id, handle) in self.handles {
            match handle.await {
                Ok(summary) => summaries.push(summary),
                Err(source) => {
                    log::error!("worker {}: task failed: {}", worker_id, source);
                    first_error.get_or_insert(PipelineError::Worker { worker_id, source });
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(summaries),
        }
    }
}

async fn connect_with_retry<S: Store>(
    store: &S,
    worker_id: usize,
    attempts: u32,
    delay: Duration,
) -> Result<S::Writer, PipelineError> {
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match store.connect_writer(worker_id).await {
            Ok(writer) => return Ok(writer),
            Err(e) if attempt < attempts => {
                log::warn!(
                    "worker {}: connect attempt {}/{} failed: {}; retrying in {:?}",
                    worker_id,
                    attempt,
                    attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(source) => {
                return Err(PipelineError::WorkerConnect {
                    worker_id,
                    attempts: attempt,
                    source,
                });
            }
        }
    }
}
