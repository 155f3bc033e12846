//! Concurrent ingestion core.
//!
//! One producer reads and normalizes input lines into fixed-size [`Batch`]es
//! and pushes them through a bounded queue to a fixed pool of writer
//! workers. The queue applies backpressure to the producer; completing it is
//! the only shutdown signal the workers need.

pub mod batch;
pub mod coordinator;
pub mod queue;
pub mod stats;
pub mod worker;

pub use batch::{Batch, BatchBuilder};
pub use coordinator::Pipeline;
pub use queue::{BatchReceiver, BatchSender, QueueClosed, batch_queue};
pub use stats::{InputCounts, Stats, StatsAccumulator, StatsReport};
pub use worker::{WorkerPool, WorkerSummary};
