//! Per-partition consumer metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics for a single partition worker
#[derive(Debug)]
pub struct PartitionMetrics {
    log: String,
    partition: u32,
    /// Records applied to the sink
    applied: AtomicU64,
    /// Records abandoned under the skip policy
    skipped: AtomicU64,
    /// Records that could not be applied
    failures: AtomicU64,
    /// Sink and read retries
    retries: AtomicU64,
    /// Next offset to read
    position: AtomicU64,
}

impl PartitionMetrics {
    pub fn new(log: impl Into<String>, partition: u32) -> Self {
        Self {
            log: log.into(),
            partition,
            applied: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            position: AtomicU64::new(0),
        }
    }

    pub fn partition(&self) -> u32 {
        self.partition
    }

    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn inc_applied(&self, latency: Duration) {
        self.applied.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            "bulk_ingest_records_applied_total",
            "log" => self.log.clone(),
            "partition" => self.partition.to_string()
        )
        .increment(1);
        metrics::histogram!("bulk_ingest_apply_latency_ms").record(latency.as_secs_f64() * 1000.0);
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn inc_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn inc_failures(&self, kind: &'static str) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            "bulk_ingest_record_failures_total",
            "log" => self.log.clone(),
            "partition" => self.partition.to_string(),
            "kind" => kind
        )
        .increment(1);
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn inc_retries(&self, operation: &'static str) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("bulk_ingest_retries_total", "operation" => operation).increment(1);
    }

    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    /// Record the read position and the lag behind `end`
    pub fn set_position(&self, position: u64, end: u64) {
        self.position.store(position, Ordering::Relaxed);
        metrics::gauge!(
            "bulk_ingest_consumer_lag",
            "log" => self.log.clone(),
            "partition" => self.partition.to_string()
        )
        .set(end.saturating_sub(position) as f64);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            partition: self.partition,
            applied: self.applied(),
            skipped: self.skipped(),
            failures: self.failures(),
            retries: self.retries(),
            position: self.position(),
        }
    }
}

/// Snapshot of partition metrics (for reporting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub partition: u32,
    pub applied: u64,
    pub skipped: u64,
    pub failures: u64,
    pub retries: u64,
    pub position: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_tracks_counters() {
        let metrics = PartitionMetrics::new("document", 2);
        metrics.inc_applied(Duration::from_millis(3));
        metrics.inc_applied(Duration::from_millis(1));
        metrics.inc_failures("corrupt_record");
        metrics.inc_skipped();
        metrics.set_position(3, 10);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.partition, 2);
        assert_eq!(snapshot.applied, 2);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.position, 3);
    }
}
