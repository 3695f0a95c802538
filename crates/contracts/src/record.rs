//! LogRecord - what a log hands back to readers

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Position of a record within one partition, starting at 0
pub type Offset = u64;

/// Appended record.
///
/// Immutable once appended; logs never rewrite or delete records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub partition: u32,
    pub offset: Offset,
    /// Id of the codec that produced `payload`
    pub codec_id: u8,
    pub payload: Bytes,
    /// Milliseconds since the Unix epoch
    pub append_timestamp: i64,
}

/// Which of the fixed logs a pipeline writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    /// Blobs with inline content
    Blob,
    /// Blob metadata only
    BlobInfo,
    /// Document records
    #[default]
    Document,
}

impl LogKind {
    /// Log name on disk
    pub fn log_name(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::BlobInfo => "blob-info",
            Self::Document => "document",
        }
    }
}

/// Consumer lag for a partition or a whole log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LogLag {
    /// Records appended but not yet committed by the group
    pub pending: u64,
    /// End offset (number of records appended)
    pub end: u64,
}

impl LogLag {
    pub fn of(pending: u64, end: u64) -> Self {
        Self { pending, end }
    }

    /// Sum of two lags
    pub fn merge(self, other: LogLag) -> Self {
        Self {
            pending: self.pending + other.pending,
            end: self.end + other.end,
        }
    }

    /// Committed position implied by this lag
    pub fn committed(&self) -> u64 {
        self.end - self.pending
    }
}
