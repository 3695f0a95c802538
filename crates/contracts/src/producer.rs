//! Producer-side abstractions
//!
//! `SourceNode` describes the hierarchical source being imported,
//! `ProducerIterator` the lazy message sequence built from it.

use std::sync::Arc;

use bytes::Bytes;

use crate::{IngestError, Message};

/// Content read from a leaf node
#[derive(Debug, Clone)]
pub struct SourceBlob {
    pub filename: String,
    pub mime_type: Option<String>,
    pub encoding: Option<String>,
    pub content: Bytes,
}

/// Node of the tree being imported.
///
/// Folder-like nodes have children; leaf nodes carry a blob. Both
/// operations may touch the underlying source and can fail, in which
/// case the walker aborts the affected branch only.
pub trait SourceNode: Send + Sync {
    /// Node name, unique within its parent
    fn name(&self) -> &str;

    /// Location in the source (file path, URL, synthetic path...)
    fn source_path(&self) -> &str;

    /// Whether the node may contain children
    fn is_folderish(&self) -> bool;

    /// Children in a stable order
    fn children(&self) -> Result<Vec<Arc<dyn SourceNode>>, IngestError>;

    /// Blob attached to this node, if any
    fn blob(&self) -> Result<Option<SourceBlob>, IngestError>;
}

/// Lazy, forward-only, read-once sequence of messages.
///
/// Items are `Result`s so that a node that cannot be read surfaces as
/// `Err(IngestError::ProducerAbort)` instead of silently vanishing; the
/// sequence may go on with the node's siblings after it. Skipping
/// or removing elements is not supported. Any resource held by an
/// implementation is released in `Drop`, which runs exactly once whether
/// the sequence was exhausted or abandoned early.
pub trait ProducerIterator: Iterator<Item = Result<Message, IngestError>> + Send {
    /// Partition of `message` among `partitions`.
    ///
    /// Must be pure: called once per message by the appender, and again on
    /// replay, with identical results. Named apart from `Iterator::partition`.
    fn partition_of(&self, message: &Message, partitions: u32) -> u32 {
        message.partition(partitions)
    }
}
