//! Message - the unit of ingestion data
//!
//! Closed set of variants produced by tree walkers and appended to a log.
//! Messages are immutable once produced.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Ingestion message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Binary payload plus metadata
    Blob(BlobMessage),

    /// Digest/length/content-type without payload
    BlobInfo(BlobInfoMessage),

    /// Structured record referencing blobs by key
    Document(DocumentMessage),
}

/// Blob with inline content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMessage {
    /// Stable blob key (ordering key)
    pub key: String,

    /// Original file name
    pub filename: Option<String>,

    /// MIME type, if known
    pub mime_type: Option<String>,

    /// Character encoding, if known
    pub encoding: Option<String>,

    /// Raw content
    pub content: Bytes,
}

/// Blob metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfoMessage {
    /// Stable blob key (ordering key)
    pub key: String,

    /// Content digest (sha256, lowercase hex)
    pub digest: String,

    /// Content length in bytes
    pub length: u64,

    pub mime_type: Option<String>,

    pub encoding: Option<String>,

    pub filename: Option<String>,
}

/// Document record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMessage {
    /// Document type (e.g. "Folder", "File")
    pub doc_type: String,

    /// Path of the parent document, "/" for top-level documents
    pub parent_path: String,

    /// Document name, unique within its parent
    pub name: String,

    /// Flat property map, ordered for deterministic encoding
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// Attached blob, referenced by key
    #[serde(default)]
    pub blob: Option<BlobInfoMessage>,
}

impl DocumentMessage {
    /// Full path of the document
    pub fn path(&self) -> String {
        if self.parent_path.ends_with('/') {
            format!("{}{}", self.parent_path, self.name)
        } else {
            format!("{}/{}", self.parent_path, self.name)
        }
    }
}

impl Message {
    /// Ordering key: messages sharing it always land on the same partition
    pub fn key(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Self::Blob(blob) => blob.key.as_str().into(),
            Self::BlobInfo(info) => info.key.as_str().into(),
            Self::Document(doc) => doc.path().into(),
        }
    }

    /// Variant label, used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Blob(_) => "blob",
            Self::BlobInfo(_) => "blob_info",
            Self::Document(_) => "document",
        }
    }

    /// Deterministic partition for this message
    pub fn partition(&self, partitions: u32) -> u32 {
        partition_for_key(&self.key(), partitions)
    }
}

/// Stable key partitioner.
///
/// CRC-32 of the key modulo the partition count. Unlike `DefaultHasher`
/// the result does not change between processes or toolchains, so a
/// replayed run routes every key to the same partition.
pub fn partition_for_key(key: &str, partitions: u32) -> u32 {
    if partitions <= 1 {
        return 0;
    }
    crc32fast::hash(key.as_bytes()) % partitions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(parent: &str, name: &str) -> Message {
        Message::Document(DocumentMessage {
            doc_type: "File".into(),
            parent_path: parent.into(),
            name: name.into(),
            properties: BTreeMap::new(),
            blob: None,
        })
    }

    #[test]
    fn test_document_path() {
        let Message::Document(doc) = document("/", "root") else {
            unreachable!()
        };
        assert_eq!(doc.path(), "/root");

        let Message::Document(doc) = document("/root/a", "b.txt") else {
            unreachable!()
        };
        assert_eq!(doc.path(), "/root/a/b.txt");
    }

    #[test]
    fn test_partition_is_stable() {
        let msg = document("/root", "report.pdf");
        let first = msg.partition(7);
        for _ in 0..100 {
            assert_eq!(msg.partition(7), first);
        }
        assert!(first < 7);
    }

    #[test]
    fn test_same_key_same_partition() {
        let blob = Message::Blob(BlobMessage {
            key: "abc".into(),
            filename: None,
            mime_type: None,
            encoding: None,
            content: Bytes::from_static(b"x"),
        });
        let info = Message::BlobInfo(BlobInfoMessage {
            key: "abc".into(),
            digest: "00".into(),
            length: 1,
            mime_type: None,
            encoding: None,
            filename: None,
        });
        assert_eq!(blob.partition(16), info.partition(16));
    }

    #[test]
    fn test_single_partition() {
        assert_eq!(partition_for_key("anything", 1), 0);
        assert_eq!(partition_for_key("anything", 0), 0);
    }

    #[test]
    fn test_keys_spread_over_partitions() {
        let mut seen = [false; 3];
        for i in 0..64 {
            seen[partition_for_key(&format!("/root/item-{i}"), 3) as usize] = true;
        }
        assert!(seen.iter().all(|hit| *hit));
    }
}
