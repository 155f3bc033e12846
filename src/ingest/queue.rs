//! Bounded batch queue between the reader and the writer workers.
//!
//! The queue is a bounded `tokio::sync::mpsc` channel split into two halves:
//!
//! - [`BatchSender`] is owned by the single producer. `push` waits while the
//!   queue holds `capacity` batches. Consuming the sender with
//!   [`BatchSender::mark_completed`] closes the queue.
//! - [`BatchReceiver`] is cloned into every worker. Workers take turns on the
//!   receiver, so each batch is popped by exactly one worker in FIFO order.
//!   Once the queue is completed and drained, every current and future `pop`
//!   returns `None`.
//!
//! If every receiver has been dropped, `push` fails with [`QueueClosed`]
//! instead of waiting for a consumer that will never come.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

use super::batch::Batch;

/// Returned by `push` when no worker is left to receive the batch.
#[derive(Debug, Error)]
#[error("batch queue closed with no remaining consumers")]
pub struct QueueClosed(pub Batch);

/// Create a queue holding at most `capacity` batches (minimum 1).
pub fn batch_queue(capacity: usize) -> (BatchSender, BatchReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        BatchSender { tx },
        BatchReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer half of the batch queue.
#[derive(Debug)]
pub struct BatchSender {
    tx: mpsc::Sender<Batch>,
}

impl BatchSender {
    /// Enqueue a batch, waiting while the queue is full.
    pub async fn push(&self, batch: Batch) -> Result<(), QueueClosed> {
        self.tx
            .send(batch)
            .await
            .map_err(|mpsc::error::SendError(batch)| QueueClosed(batch))
    }

    /// Blocking variant of [`push`](Self::push) for the reader thread.
    ///
    /// Must not be called from inside an async task.
    pub fn blocking_push(&self, batch: Batch) -> Result<(), QueueClosed> {
        self.tx
            .blocking_send(batch)
            .map_err(|mpsc::error::SendError(batch)| QueueClosed(batch))
    }

    /// Batches currently waiting in the queue.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Signal that no more batches will be pushed.
    ///
    /// Workers drain what is already queued and then observe `None`.
    pub fn mark_completed(self) {
        log::debug!("batch queue completed with {} batch(es) pending", self.len());
        drop(self.tx);
    }
}

/// Consumer half of the batch queue, shared by all workers.
#[derive(Debug, Clone)]
pub struct BatchReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Batch>>>,
}

impl BatchReceiver {
    /// Take the next batch, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is completed and fully drained.
    pub async fn pop(&self) -> Option<Batch> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// Blocking variant of [`pop`](Self::pop) for synchronous consumers.
    pub fn blocking_pop(&self) -> Option<Batch> {
        let mut rx = self.rx.blocking_lock();
        rx.blocking_recv()
    }
}
