//! Batches of normalized records and the builder that fills them.

use super::queue::{BatchSender, QueueClosed};
use crate::locode::NormalizedRecord;

/// A group of records moved through the pipeline as one unit.
///
/// A batch has a single owner at any time: the builder, a queue slot, or the
/// worker writing it.
#[derive(Debug, Clone)]
pub struct Batch {
    sequence: u64,
    records: Vec<NormalizedRecord>,
}

impl Batch {
    pub fn with_capacity(sequence: u64, capacity: usize) -> Self {
        Self {
            sequence,
            records: Vec::with_capacity(capacity),
        }
    }

    /// Position of this batch in production order, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn push(&mut self, record: NormalizedRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[NormalizedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Fills fixed-size batches and hands each full batch to the queue.
pub struct BatchBuilder {
    sender: BatchSender,
    batch_size: usize,
    current: Batch,
    batches_sent: u64,
}

impl BatchBuilder {
    pub fn new(sender: BatchSender, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sender,
            batch_size,
            current: Batch::with_capacity(0, batch_size),
            batches_sent: 0,
        }
    }

    /// Add a record, pushing the batch once it reaches `batch_size`.
    ///
    /// Blocks while the queue is full.
    pub fn add(&mut self, record: NormalizedRecord) -> Result<(), QueueClosed> {
        self.current.push(record);
        if self.current.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), QueueClosed> {
        let next = Batch::with_capacity(self.batches_sent + 1, self.batch_size);
        let full = std::mem::replace(&mut self.current, next);

        log::trace!("queueing batch {} ({} records)", full.sequence(), full.len());
        self.sender.blocking_push(full)?;
        self.batches_sent += 1;
        Ok(())
    }

    /// Batches handed to the queue so far.
    pub fn batches_sent(&self) -> u64 {
        self.batches_sent
    }

    /// Push the trailing partial batch, if any, and return the sender.
    ///
    /// An empty trailing batch is discarded without entering the queue.
    pub fn finish(mut self) -> Result<BatchSender, QueueClosed> {
        if !self.current.is_empty() {
            self.flush()?;
        }
        Ok(self.sender)
    }
}
