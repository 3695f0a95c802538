//! Consumer outcomes and failure reports

use std::time::Duration;

use contracts::{EntityId, FailurePolicy, IngestError, Offset};

use crate::metrics::MetricsSnapshot;

/// A record that could not be applied.
///
/// Carries enough context to replay the partition from `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub log: String,
    pub partition: u32,
    pub offset: Offset,
    /// Error kind, as in `IngestError::kind`
    pub kind: &'static str,
    pub error: String,
    /// Skip: the cursor moved past the record. Halt: the partition stopped on it.
    pub action: FailurePolicy,
}

impl FailureReport {
    pub fn new(
        log: impl Into<String>,
        partition: u32,
        offset: Offset,
        error: &IngestError,
        action: FailurePolicy,
    ) -> Self {
        Self {
            log: log.into(),
            partition,
            offset,
            kind: error.kind(),
            error: error.to_string(),
            action,
        }
    }
}

impl std::fmt::Display for FailureReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}]@{} {:?} ({}): {}",
            self.log, self.partition, self.offset, self.action, self.kind, self.error
        )
    }
}

/// Events streamed from partition workers to the pool owner
#[derive(Debug, Clone)]
pub enum ConsumerEvent {
    Applied {
        partition: u32,
        offset: Offset,
        entity: EntityId,
        latency: Duration,
    },
    Failed(FailureReport),
}

/// How a partition worker ended
#[derive(Debug)]
pub enum PartitionOutcome {
    /// Producers finished and every record was consumed
    Drained,
    /// Pipeline cancelled; the cursor points at the first unapplied record
    Cancelled,
    /// Stopped on an unapplicable record under the halt policy
    Halted { offset: Offset },
    /// Unrecoverable read or lease error
    Failed(IngestError),
}

impl PartitionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Drained => "drained",
            Self::Cancelled => "cancelled",
            Self::Halted { .. } => "halted",
            Self::Failed(_) => "failed",
        }
    }
}

/// Final state of one partition
#[derive(Debug)]
pub struct PartitionSummary {
    pub partition: u32,
    pub outcome: PartitionOutcome,
    /// Committed cursor at exit
    pub committed: Offset,
    pub metrics: MetricsSnapshot,
}

/// Result of a consumer pool run
#[derive(Debug, Default)]
pub struct ConsumerReport {
    pub log: String,
    pub group: String,
    /// One entry per assigned partition, ordered by partition
    pub partitions: Vec<PartitionSummary>,
    pub failures: Vec<FailureReport>,
}

impl ConsumerReport {
    pub fn applied(&self) -> u64 {
        self.partitions.iter().map(|p| p.metrics.applied).sum()
    }

    pub fn skipped(&self) -> u64 {
        self.partitions.iter().map(|p| p.metrics.skipped).sum()
    }

    pub fn partition(&self, partition: u32) -> Option<&PartitionSummary> {
        self.partitions.iter().find(|p| p.partition == partition)
    }

    /// Partitions that stopped under the halt policy
    pub fn halted(&self) -> Vec<u32> {
        self.partitions
            .iter()
            .filter(|p| matches!(p.outcome, PartitionOutcome::Halted { .. }))
            .map(|p| p.partition)
            .collect()
    }

    /// Partitions that hit an unrecoverable error
    pub fn failed(&self) -> Vec<u32> {
        self.partitions
            .iter()
            .filter(|p| matches!(p.outcome, PartitionOutcome::Failed(_)))
            .map(|p| p.partition)
            .collect()
    }

    /// Some partition did not drain cleanly
    pub fn is_degraded(&self) -> bool {
        !self.halted().is_empty() || !self.failed().is_empty()
    }

    pub fn all_drained(&self) -> bool {
        self.partitions
            .iter()
            .all(|p| matches!(p.outcome, PartitionOutcome::Drained))
    }
}
