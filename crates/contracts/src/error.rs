//! Layered error definitions
//!
//! Categorized by source: config / codec / log storage / producer / consumer / sink

use thiserror::Error;

/// Unified pipeline error type
#[derive(Debug, Error)]
pub enum IngestError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Codec Errors =====
    /// No codec registered under this name
    #[error("unknown codec '{name}'")]
    UnknownCodec { name: String },

    /// Record bytes could not be decoded
    #[error("corrupt record in '{log}' partition {partition} at offset {offset}: {message}")]
    CorruptRecord {
        log: String,
        partition: u32,
        offset: u64,
        message: String,
    },

    // ===== Log Storage Errors =====
    /// Log or sink temporarily unavailable, safe to retry
    #[error("transient io error ({context}): {source}")]
    TransientIo {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// On-disk inconsistency, never retried
    #[error("storage corruption in '{log}' partition {partition} near offset {offset}: {message}")]
    StorageCorruption {
        log: String,
        partition: u32,
        offset: u64,
        message: String,
    },

    /// Log reopened with another partition count
    #[error("log '{log}' has {actual} partitions, requested {requested}")]
    PartitionCountMismatch {
        log: String,
        requested: u32,
        actual: u32,
    },

    /// Partition index outside `[0, partitions)`
    #[error("invalid partition {partition} for log '{log}' with {partitions} partitions")]
    InvalidPartition {
        log: String,
        partition: u32,
        partitions: u32,
    },

    /// Payload too large to frame, refused before anything is written
    #[error("payload of {size} bytes for '{log}' partition {partition} exceeds the {max} byte limit")]
    InvalidPayload {
        log: String,
        partition: u32,
        size: u64,
        max: u64,
    },

    /// Log does not exist
    #[error("log '{log}' not found")]
    LogNotFound { log: String },

    /// Another consumer already owns this cursor
    #[error("partition {partition} of '{log}' is already consumed by group '{group}'")]
    PartitionBusy {
        log: String,
        group: String,
        partition: u32,
    },

    // ===== Producer Errors =====
    /// Source branch could not be read, the branch worker stops
    #[error("producer aborted at '{node}': {message}")]
    ProducerAbort { node: String, message: String },

    // ===== Consumer Errors =====
    /// Retry budget exhausted, surfaced to the pipeline owner
    #[error("partition {partition} of '{log}' failed at offset {offset}: {message}")]
    PartitionFailure {
        log: String,
        partition: u32,
        offset: u64,
        message: String,
    },

    /// Sink error
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Pipeline cancellation observed
    #[error("operation cancelled")]
    Cancelled,

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl IngestError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Wrap an io error as retryable
    pub fn transient(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::TransientIo {
            context: context.into(),
            source,
        }
    }

    /// Create storage corruption error
    pub fn storage_corruption(
        log: impl Into<String>,
        partition: u32,
        offset: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::StorageCorruption {
            log: log.into(),
            partition,
            offset,
            message: message.into(),
        }
    }

    /// Create corrupt record error
    pub fn corrupt_record(
        log: impl Into<String>,
        partition: u32,
        offset: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::CorruptRecord {
            log: log.into(),
            partition,
            offset,
            message: message.into(),
        }
    }

    /// Create partition failure error
    pub fn partition_failure(
        log: impl Into<String>,
        partition: u32,
        offset: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::PartitionFailure {
            log: log.into(),
            partition,
            offset,
            message: message.into(),
        }
    }

    /// Create producer abort error
    pub fn producer_abort(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProducerAbort {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Whether the operation may succeed if retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientIo { .. } => true,
            Self::Sink(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether pipeline startup must abort on this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StorageCorruption { .. }
                | Self::PartitionCountMismatch { .. }
                | Self::ConfigParse { .. }
                | Self::ConfigValidation { .. }
                | Self::UnknownCodec { .. }
        )
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigParse { .. } => "config_parse",
            Self::ConfigValidation { .. } => "config_validation",
            Self::UnknownCodec { .. } => "unknown_codec",
            Self::CorruptRecord { .. } => "corrupt_record",
            Self::TransientIo { .. } => "transient_io",
            Self::StorageCorruption { .. } => "storage_corruption",
            Self::PartitionCountMismatch { .. } => "partition_count_mismatch",
            Self::InvalidPartition { .. } => "invalid_partition",
            Self::InvalidPayload { .. } => "invalid_payload",
            Self::LogNotFound { .. } => "log_not_found",
            Self::PartitionBusy { .. } => "partition_busy",
            Self::ProducerAbort { .. } => "producer_abort",
            Self::PartitionFailure { .. } => "partition_failure",
            Self::Sink(_) => "sink",
            Self::Cancelled => "cancelled",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}

/// Errors reported by a [`MessageSink`](crate::MessageSink)
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// Backend temporarily unavailable
    #[error("sink '{sink_name}' temporarily unavailable: {message}")]
    Transient { sink_name: String, message: String },

    /// Message refused, retrying will not help
    #[error("sink '{sink_name}' rejected message: {message}")]
    Rejected { sink_name: String, message: String },
}

impl SinkError {
    /// Create a transient sink error
    pub fn transient(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create a rejection
    pub fn rejected(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
