//! 合成数据源
//!
//! Deterministic generated tree for load tests and demos, no real source
//! needed. A tree of depth `d` and fan-out `f` has `f^d` leaves.

use std::sync::Arc;

use bytes::Bytes;
use contracts::{IngestError, SourceBlob, SourceNode};

use crate::producer::digest;

/// Generated node.
///
/// Nodes above `depth` are folders with `fan_out` children; nodes at
/// `depth` are text items whose content is derived from their path.
#[derive(Debug, Clone)]
pub struct SyntheticSourceNode {
    name: String,
    source_path: String,
    level: usize,
    fan_out: usize,
    depth: usize,
    blob_size: usize,
}

impl SyntheticSourceNode {
    pub fn root(fan_out: usize, depth: usize, blob_size: usize) -> Self {
        Self {
            name: "synthetic".to_string(),
            source_path: "synthetic:/".to_string(),
            level: 0,
            fan_out,
            depth,
            blob_size,
        }
    }

    fn child(&self, index: usize) -> Self {
        let leaf = self.level + 1 == self.depth;
        let name = if leaf {
            format!("item-{index:04}.txt")
        } else {
            format!("folder-{index:04}")
        };
        let source_path = if self.source_path.ends_with('/') {
            format!("{}{}", self.source_path, name)
        } else {
            format!("{}/{}", self.source_path, name)
        };

        Self {
            name,
            source_path,
            level: self.level + 1,
            ..self.clone()
        }
    }

    /// Leaves under a root of this shape
    pub fn leaf_count(fan_out: usize, depth: usize) -> usize {
        fan_out.saturating_pow(depth as u32)
    }

    /// Exactly `blob_size` bytes; the leading path digest keeps items
    /// distinct even when the content is shorter than the path
    fn content(&self) -> Bytes {
        let seed = format!("{} {}\n", digest(self.source_path.as_bytes()), self.source_path);
        seed.bytes()
            .cycle()
            .take(self.blob_size)
            .collect::<Vec<u8>>()
            .into()
    }
}

impl SourceNode for SyntheticSourceNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_path(&self) -> &str {
        &self.source_path
    }

    fn is_folderish(&self) -> bool {
        self.level < self.depth
    }

    fn children(&self) -> Result<Vec<Arc<dyn SourceNode>>, IngestError> {
        if !self.is_folderish() {
            return Ok(Vec::new());
        }
        Ok((0..self.fan_out)
            .map(|i| Arc::new(self.child(i)) as Arc<dyn SourceNode>)
            .collect())
    }

    fn blob(&self) -> Result<Option<SourceBlob>, IngestError> {
        if self.is_folderish() {
            return Ok(None);
        }
        Ok(Some(SourceBlob {
            filename: self.name.clone(),
            mime_type: Some("text/plain".to_string()),
            encoding: Some("utf-8".to_string()),
            content: self.content(),
        }))
    }
}
