//! PipelineBlueprint - Config Loader output
//!
//! Describes a complete ingestion run: log storage, producers, consumers,
//! retry policy and the target sink.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::LogKind;

/// Name of the codec used when none is configured
pub const DEFAULT_CODEC: &str = "bincode";

/// Name of the fork policy used when none is configured
pub const DEFAULT_FORK_POLICY: &str = "adaptive";

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineBlueprint {
    #[serde(default)]
    pub version: ConfigVersion,

    /// Log storage
    pub log: LogConfig,

    /// Source tree walking
    pub producer: ProducerConfig,

    /// Log draining
    #[serde(default)]
    pub consumer: ConsumerConfig,

    /// Backoff for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Target store
    pub sink: SinkConfig,
}

/// Log storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Storage backend profile
    #[serde(default)]
    pub backend: LogBackend,

    /// Root directory (file backend)
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Which log this pipeline feeds
    #[serde(default)]
    pub name: LogKind,

    /// Partition count, fixed at log creation
    pub partitions: u32,

    /// Codec used to encode appended messages
    #[serde(default = "default_codec")]
    pub codec: String,
}

fn default_codec() -> String {
    DEFAULT_CODEC.to_string()
}

/// Log storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogBackend {
    /// Directory per log, file per partition
    #[default]
    File,
    /// Process-local, lost on exit
    Memory,
}

/// Producer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Target batch size; drives the fork threshold and cursor commits
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Cap on concurrently scheduled branch workers
    #[serde(default = "default_max_concurrent_producers")]
    pub max_concurrent_producers: usize,

    /// Fork policy name
    #[serde(default = "default_fork_policy")]
    pub fork_policy: String,

    /// Tree to import
    pub source: SourceConfig,
}

fn default_batch_size() -> u64 {
    50
}

fn default_max_concurrent_producers() -> usize {
    5
}

fn default_fork_policy() -> String {
    DEFAULT_FORK_POLICY.to_string()
}

/// Source tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Local directory tree
    Filesystem { path: PathBuf },

    /// Generated tree, for load tests and demos
    Synthetic {
        #[serde(default = "default_fan_out")]
        fan_out: usize,
        #[serde(default = "default_depth")]
        depth: usize,
        #[serde(default = "default_blob_size")]
        blob_size: usize,
    },
}

fn default_fan_out() -> usize {
    3
}

fn default_depth() -> usize {
    2
}

fn default_blob_size() -> usize {
    1024
}

/// Consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Consumer group owning the committed cursors
    #[serde(default = "default_group")]
    pub group: String,

    /// Number of consumers (defaults to the partition count)
    #[serde(default)]
    pub consumers: Option<u32>,

    /// What to do with a record that cannot be applied
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Whether a halted partition fails the whole pipeline
    #[serde(default)]
    pub on_partition_halt: HaltEscalation,

    /// Wait between polls once caught up
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group: default_group(),
            consumers: None,
            failure_policy: FailurePolicy::default(),
            on_partition_halt: HaltEscalation::default(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_group() -> String {
    "bulk-import".to_string()
}

fn default_poll_interval_ms() -> u64 {
    50
}

/// Handling of corrupt records and exhausted sink retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Report the record and advance past it
    #[default]
    Skip,
    /// Report the record and stop consuming the partition
    Halt,
}

/// Effect of a halted partition on the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltEscalation {
    /// Other partitions keep running, the run ends degraded
    #[default]
    Degrade,
    /// Cancel the whole pipeline
    FailPipeline,
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub kind: BackoffKind,

    /// Base delay in milliseconds
    #[serde(default = "default_retry_base_ms")]
    pub base_ms: u64,

    /// Total time that may be spent waiting, in milliseconds
    #[serde(default = "default_retry_budget_ms")]
    pub budget_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            kind: BackoffKind::default(),
            base_ms: default_retry_base_ms(),
            budget_ms: default_retry_budget_ms(),
        }
    }
}

fn default_retry_base_ms() -> u64 {
    2
}

fn default_retry_budget_ms() -> u64 {
    5_000
}

/// Delay growth between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    #[default]
    Exponential,
}

/// Sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Tracing output only
    Log,
    /// Entities written under a base directory
    Directory,
    /// Process-local store
    Memory,
}

impl PipelineBlueprint {
    /// Name of the log this pipeline feeds
    pub fn log_name(&self) -> &'static str {
        self.log.name.log_name()
    }

    /// `min(partitions, consumers)`
    pub fn consumer_count(&self) -> u32 {
        let requested = self.consumer.consumers.unwrap_or(self.log.partitions);
        requested.min(self.log.partitions)
    }

    /// Partitions drained by this process; consumer `i` owns partition `i`
    pub fn assigned_partitions(&self) -> Vec<u32> {
        (0..self.consumer_count()).collect()
    }

    /// Partitions left for another consumer pool
    pub fn unassigned_partitions(&self) -> Vec<u32> {
        (self.consumer_count()..self.log.partitions).collect()
    }
}
