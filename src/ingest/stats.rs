//! Run statistics shared between the reader and the workers.
//!
//! Every mutation goes through one `parking_lot` mutex. The final numbers are
//! taken with [`StatsAccumulator::finish`] once every worker has stopped.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::store::WriteOutcome;

/// Cumulative counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// Lines decoded successfully.
    pub records_read: u64,
    /// Lines skipped because they could not be decoded.
    pub lines_skipped: u64,
    /// Records emitted with the `(0, 0)` coordinate fallback.
    pub coordinate_fallbacks: u64,
    /// Records accepted by the writer in batches that committed.
    pub records_processed: u64,
    /// Records that were new in the store (duplicates excluded).
    pub records_inserted: u64,
    /// Records excluded by writer-side validation.
    pub records_rejected: u64,
    pub batches_written: u64,
    pub batches_failed: u64,
    /// Records lost with failed batches.
    pub records_dropped: u64,
    /// Time spent decoding and normalizing, summed over all lines.
    pub parse_time: Duration,
    /// Time spent in successful bulk writes, summed over all workers.
    pub write_time: Duration,
}

/// Counters the reader reports alongside its parse time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputCounts {
    pub records_read: u64,
    pub lines_skipped: u64,
    pub coordinate_fallbacks: u64,
}

/// Cloneable handle to the run's statistics.
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
    inner: Arc<Mutex<Stats>>,
    started: Instant,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Stats::default())),
            started: Instant::now(),
        }
    }

    pub fn add_parse_time(&self, elapsed: Duration) {
        self.inner.lock().parse_time += elapsed;
    }

    pub fn add_input(&self, counts: InputCounts) {
        let mut stats = self.inner.lock();
        stats.records_read += counts.records_read;
        stats.lines_skipped += counts.lines_skipped;
        stats.coordinate_fallbacks += counts.coordinate_fallbacks;
    }

    /// Account for a committed batch: write time and record counts together.
    pub fn record_batch_written(&self, outcome: &WriteOutcome, elapsed: Duration) {
        let mut stats = self.inner.lock();
        stats.write_time += elapsed;
        stats.records_processed += outcome.accepted;
        stats.records_inserted += outcome.inserted;
        stats.records_rejected += outcome.rejected;
        stats.batches_written += 1;
    }

    pub fn record_batch_failed(&self, records: usize) {
        let mut stats = self.inner.lock();
        stats.batches_failed += 1;
        stats.records_dropped += records as u64;
    }

    /// Current counters. Only stable once all workers have stopped.
    pub fn snapshot(&self) -> Stats {
        self.inner.lock().clone()
    }

    /// Freeze the counters and measure the wall-clock time of the run.
    pub fn finish(self) -> StatsReport {
        let elapsed = self.started.elapsed();
        let stats = match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().clone(),
        };
        StatsReport { stats, elapsed }
    }
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Final statistics with the total wall-clock time.
#[derive(Debug, Clone)]
pub struct StatsReport {
    pub stats: Stats,
    pub elapsed: Duration,
}

impl StatsReport {
    pub fn records_per_second(&self) -> f64 {
        ratio(self.stats.records_processed as f64, self.elapsed.as_secs_f64())
    }

    pub fn seconds_per_record(&self) -> f64 {
        ratio(self.elapsed.as_secs_f64(), self.stats.records_processed as f64)
    }

    /// Wall time not attributed to parsing or writing.
    pub fn other_time(&self) -> Duration {
        self.elapsed
            .saturating_sub(self.stats.parse_time)
            .saturating_sub(self.stats.write_time)
    }

    fn percent_of_total(&self, part: Duration) -> f64 {
        ratio(part.as_secs_f64(), self.elapsed.as_secs_f64()) * 100.0
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.stats;
        writeln!(f, "Benchmark Results:")?;
        writeln!(f, "Total records processed: {}", stats.records_processed)?;
        writeln!(f, "Total time: {:.2} seconds", self.elapsed.as_secs_f64())?;
        writeln!(
            f,
            "File parsing time: {:.8} seconds ({:.1}%)",
            stats.parse_time.as_secs_f64(),
            self.percent_of_total(stats.parse_time)
        )?;
        writeln!(
            f,
            "Database time: {:.2} seconds ({:.1}%)",
            stats.write_time.as_secs_f64(),
            self.percent_of_total(stats.write_time)
        )?;
        writeln!(
            f,
            "Other operations: {:.2} seconds ({:.1}%)",
            self.other_time().as_secs_f64(),
            self.percent_of_total(self.other_time())
        )?;
        writeln!(
            f,
            "Average time per record: {:.6} seconds",
            self.seconds_per_record()
        )?;
        writeln!(f, "Records per second: {:.1}", self.records_per_second())?;
        writeln!(
            f,
            "Lines read: {} ({} skipped, {} without coordinates)",
            stats.records_read, stats.lines_skipped, stats.coordinate_fallbacks
        )?;
        writeln!(
            f,
            "Rows inserted: {} ({} rejected by validation)",
            stats.records_inserted, stats.records_rejected
        )?;
        writeln!(
            f,
            "Batches: {} written, {} failed ({} records dropped)",
            stats.batches_written, stats.batches_failed, stats.records_dropped
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let stats = StatsAccumulator::new();
        let outcome = WriteOutcome {
            accepted: 10,
            inserted: 7,
            rejected: 1,
        };

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let stats = stats.clone();
                scope.spawn(move || {
                    for _ in 0..100 {
                        stats.record_batch_written(&outcome, Duration::from_millis(1));
                        stats.add_parse_time(Duration::from_micros(10));
                    }
                });
            }
        });

        let report = stats.finish();
        assert_eq!(report.stats.batches_written, 800);
        assert_eq!(report.stats.records_processed, 8000);
        assert_eq!(report.stats.records_inserted, 5600);
        assert_eq!(report.stats.records_rejected, 800);
        assert_eq!(report.stats.write_time, Duration::from_millis(800));
        assert_eq!(report.stats.parse_time, Duration::from_micros(8000));
    }

    #[test]
    fn test_failed_batches_do_not_count_as_processed() {
        let stats = StatsAccumulator::new();
        stats.record_batch_failed(24);
        stats.add_input(InputCounts {
            records_read: 24,
            lines_skipped: 2,
            coordinate_fallbacks: 3,
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.records_processed, 0);
        assert_eq!(snapshot.records_dropped, 24);
        assert_eq!(snapshot.batches_failed, 1);
        assert_eq!(snapshot.lines_skipped, 2);
        assert_eq!(snapshot.write_time, Duration::ZERO);
    }

    #[test]
    fn test_report_handles_empty_run() {
        let report = StatsReport {
            stats: Stats::default(),
            elapsed: Duration::ZERO,
        };

        assert_eq!(report.records_per_second(), 0.0);
        assert_eq!(report.seconds_per_record(), 0.0);

        let rendered = report.to_string();
        assert!(rendered.contains("Total records processed: 0"));
        assert!(rendered.contains("Records per second: 0.0"));
    }

    #[test]
    fn test_other_time_never_negative() {
        let report = StatsReport {
            stats: Stats {
                records_processed: 100,
                write_time: Duration::from_secs(9),
                ..Stats::default()
            },
            elapsed: Duration::from_secs(4),
        };

        assert_eq!(report.other_time(), Duration::ZERO);
        assert!((report.records_per_second() - 25.0).abs() < 1e-9);
    }
}
