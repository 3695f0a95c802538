//! Consumer - drains a partitioned log into a sink
//!
//! One worker per assigned partition. Each worker is the only owner of its
//! `(group, partition)` cursor, applies records in offset order and
//! commits its position as it goes.

pub mod metrics;
mod pool;
mod report;
pub mod sinks;
mod worker;

pub use crate::metrics::{MetricsSnapshot, PartitionMetrics};
pub use pool::{ConsumerPool, ConsumerPoolBuilder};
pub use report::{ConsumerEvent, ConsumerReport, FailureReport, PartitionOutcome, PartitionSummary};
pub use sinks::{
    entity_id, ConfiguredSink, DirectorySink, DirectorySinkConfig, LogSink, MemorySink,
    SinkFactory,
};
pub use worker::{PartitionWorker, WorkerSettings};
