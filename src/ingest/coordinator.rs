//! Pipeline orchestration for a single ingestion run.
//!
//! The [`Pipeline`] drives a run in a fixed order:
//! 1. Open the input file
//! 2. Ensure the destination schema on a short-lived connection
//! 3. Connect every writer and start the worker pool
//! 4. Read, decode and normalize lines on a blocking thread, feeding batches
//!    into the bounded queue
//! 5. Flush the trailing batch and mark the queue completed
//! 6. Join the producer and every worker
//! 7. Freeze the statistics into a [`StatsReport`]
//!
//! Statistics are only read after step 6, once nothing can write to them.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::{Duration, Instant};

use super::batch::BatchBuilder;
use super::queue::{BatchSender, batch_queue};
use super::stats::{InputCounts, StatsAccumulator, StatsReport};
use super::worker::WorkerPool;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::locode::{DecodeError, RawRecord, normalize_with_coordinate_check};
use crate::store::Store;

/// Skipped lines logged individually before switching to a summary.
const MAX_SKIP_WARNINGS: u64 = 10;

/// Ingestion pipeline bound to one destination store.
pub struct Pipeline<S> {
    store: S,
    config: PipelineConfig,
}

impl<S: Store> Pipeline<S> {
    pub fn new(store: S, config: PipelineConfig) -> Self {
        Self {
            store,
            config: config.clamped(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load every record of the file at `path` into the store.
    pub async fn run(&self, path: &Path) -> Result<StatsReport, PipelineError> {
        let file = File::open(path).map_err(|source| PipelineError::OpenInput {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("loading {}", path.display());

        self.store
            .ensure_schema()
            .await
            .map_err(PipelineError::Schema)?;

        let stats = StatsAccumulator::new();
        let (sender, receiver) = batch_queue(self.config.queue_capacity);

        // Workers exist before the first line is read
        let pool = WorkerPool::start(&self.store, &self.config, receiver, stats.clone()).await?;

        let producer = {
            let stats = stats.clone();
            let batch_size = self.config.batch_size;
            let skip_header = self.config.skip_header;
            tokio::task::spawn_blocking(move || {
                produce(BufReader::new(file), sender, batch_size, skip_header, &stats)
            })
        };

        // Join the workers even if the producer failed, so no task outlives the run
        let produced = producer.await.map_err(PipelineError::Producer);
        let workers = pool.join().await;

        let counts = produced??;
        for summary in workers? {
            log::info!(
                "worker {}: {} batch(es) written, {} failed",
                summary.worker_id,
                summary.batches_written,
                summary.batches_failed
            );
        }

        let report = stats.finish();
        log::info!(
            "run complete: {} read, {} skipped, {} processed, {} dropped",
            counts.records_read,
            counts.lines_skipped,
            report.stats.records_processed,
            report.stats.records_dropped
        );
        Ok(report)
    }
}

/// Read side of the pipeline. Runs on a blocking thread.
///
/// Lines are read as raw bytes and decoded one at a time, so a malformed
/// line is skipped on its own. Blank lines are ignored.
///
/// Consumes the sender: whichever way this returns, the queue is closed and
/// the workers drain what is left.
fn produce<R: BufRead>(
    mut input: R,
    sender: BatchSender,
    batch_size: usize,
    skip_header: bool,
    stats: &StatsAccumulator,
) -> Result<InputCounts, PipelineError> {
    let mut builder = BatchBuilder::new(sender, batch_size);
    let mut counts = InputCounts::default();
    let mut parse_time = Duration::ZERO;
    let mut line = Vec::new();
    let mut line_number: u64 = 0;

    let result = loop {
        line.clear();
        match input.read_until(b'\n', &mut line) {
            Ok(0) => break Ok(()),
            Ok(_) => line_number += 1,
            Err(e) => break Err(PipelineError::Read(e)),
        }

        if (skip_header && line_number == 1) || line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let started = Instant::now();
        let decoded = RawRecord::decode_bytes(&line).map(normalize_with_coordinate_check);
        parse_time += started.elapsed();

        let (normalized, coordinates_parsed) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                counts.lines_skipped += 1;
                report_skipped(line_number, &e, counts.lines_skipped);
                continue;
            }
        };

        counts.records_read += 1;
        if !coordinates_parsed {
            counts.coordinate_fallbacks += 1;
        }

        if let Err(closed) = builder.add(normalized) {
            log::error!(
                "no worker left to receive batch {}; stopping input",
                closed.0.sequence()
            );
            break Err(PipelineError::QueueClosed);
        }
    };

    stats.add_parse_time(parse_time);
    stats.add_input(counts);

    // On error the builder is dropped here, which closes the queue
    result?;

    let sender = builder.finish().map_err(|_| PipelineError::QueueClosed)?;
    sender.mark_completed();

    if counts.lines_skipped > MAX_SKIP_WARNINGS {
        log::warn!(
            "skipped {} undecodable line(s) in total",
            counts.lines_skipped
        );
    }
    if counts.records_read == 0 {
        log::warn!("input contained no location records");
    } else {
        log::info!(
            "input done: {} records, parse time {:?}",
            counts.records_read,
            parse_time
        );
    }

    Ok(counts)
}

fn report_skipped(line: u64, error: &DecodeError, skipped: u64) {
    // Country rows carry no location code and are expected in every file
    if let DecodeError::MissingLocationCode { .. } = error {
        log::debug!("line {}: {}", line, error);
        return;
    }

    if skipped <= MAX_SKIP_WARNINGS {
        log::warn!("line {}: skipped: {}", line, error);
    } else {
        log::debug!("line {}: skipped: {}", line, error);
    }
}
