//! Producer metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters shared by every branch worker of a run
#[derive(Debug, Default)]
pub struct ProducerMetrics {
    /// Messages yielded by walkers
    pub produced: AtomicU64,

    /// Records durably appended
    pub appended: AtomicU64,

    /// Branches handed to a new worker
    pub forks: AtomicU64,

    /// Branch workers stopped by an unreadable node
    pub aborts: AtomicU64,

    /// Append retries after transient failures
    pub retries: AtomicU64,

    /// Branch workers currently scheduled
    pub scheduled: AtomicUsize,
}

impl ProducerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_produced(&self) {
        self.produced.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("bulk_ingest_messages_produced_total").increment(1);
    }

    pub fn record_appended(&self) {
        self.appended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fork(&self) {
        self.forks.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("bulk_ingest_producer_forks_total").increment(1);
    }

    pub fn record_abort(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("bulk_ingest_retries_total", "operation" => "append").increment(1);
    }

    /// Reserve a worker slot
    pub fn schedule(&self) -> usize {
        let scheduled = self.scheduled.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::gauge!("bulk_ingest_active_producers").set(scheduled as f64);
        scheduled
    }

    /// Release a worker slot
    pub fn unschedule(&self) {
        let scheduled = self.scheduled.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        metrics::gauge!("bulk_ingest_active_producers").set(scheduled as f64);
    }

    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::Relaxed)
    }

    pub fn scheduled(&self) -> usize {
        self.scheduled.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ProducerReport {
        ProducerReport {
            produced: self.produced.load(Ordering::Relaxed),
            appended: self.appended.load(Ordering::Relaxed),
            forks: self.forks.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            cancelled: false,
        }
    }
}

/// Outcome of a producer run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerReport {
    pub produced: u64,
    pub appended: u64,
    pub forks: u64,
    pub aborts: u64,
    pub retries: u64,
    /// Walk stopped early by cancellation
    pub cancelled: bool,
}
