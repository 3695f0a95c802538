//! TreeProducer - depth-first message iterator over one branch

use std::collections::BTreeMap;
use std::sync::Arc;

use async_channel::Sender;
use contracts::{
    BlobInfoMessage, BlobMessage, DocumentMessage, IngestError, LogKind, Message,
    ProducerIterator, SourceBlob, SourceNode,
};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::fork::ForkPolicy;
use crate::metrics::ProducerMetrics;

/// Subtree handed to a new worker
#[derive(Clone)]
pub struct Branch {
    pub node: Arc<dyn SourceNode>,
    /// Target path of the node's parent
    pub parent_path: String,
}

impl std::fmt::Debug for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Branch")
            .field("node", &self.node.source_path())
            .field("parent_path", &self.parent_path)
            .finish()
    }
}

/// What a walker needs to hand branches to the pool
#[derive(Clone)]
pub struct ForkContext {
    pub policy: Arc<dyn ForkPolicy>,
    pub batch_size: u64,
    pub metrics: Arc<ProducerMetrics>,
    pub forks: Sender<Branch>,
    pub token: CancellationToken,
}

impl ForkContext {
    fn need_fork(&self) -> bool {
        !self.token.is_cancelled()
            && self.policy.need_fork(
                self.metrics.produced(),
                self.batch_size,
                self.metrics.scheduled(),
            )
    }
}

struct Visit {
    node: Arc<dyn SourceNode>,
    parent_path: String,
    /// Import root: a folder is not emitted and its children land directly
    /// under `parent_path`; a single item is emitted there
    import_root: bool,
}

/// Lazy walk over one branch of a source tree.
///
/// Emits at most one message per node, as required by the target log:
/// - document log: a `DocumentMessage` per node; items carry their blob info
/// - blob log: a `BlobMessage` per item
/// - blob-info log: a `BlobInfoMessage` per item
///
/// An unreadable node yields `Err(ProducerAbort)` and its subtree is
/// dropped; the walk then goes on with the remaining nodes, so siblings of
/// the node are still produced.
pub struct TreeProducer {
    kind: LogKind,
    stack: Vec<Visit>,
    fork: Option<ForkContext>,
    token: CancellationToken,
    visited: u64,
}

impl TreeProducer {
    /// Walk everything below `root`, placing its children under `target_root`
    pub fn import(root: Arc<dyn SourceNode>, target_root: impl Into<String>, kind: LogKind) -> Self {
        Self::with_visit(
            Visit {
                node: root,
                parent_path: target_root.into(),
                import_root: true,
            },
            kind,
        )
    }

    /// Walk a forked branch: the branch node itself and everything below
    pub fn branch(branch: Branch, kind: LogKind) -> Self {
        Self::with_visit(
            Visit {
                node: branch.node,
                parent_path: branch.parent_path,
                import_root: false,
            },
            kind,
        )
    }

    fn with_visit(visit: Visit, kind: LogKind) -> Self {
        Self {
            kind,
            stack: vec![visit],
            fork: None,
            token: CancellationToken::new(),
            visited: 0,
        }
    }

    /// Hand folder-like nodes to other workers when the policy says so
    pub fn with_fork(mut self, fork: ForkContext) -> Self {
        self.token = fork.token.clone();
        self.fork = Some(fork);
        self
    }

    /// Stop walking once `token` fires
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Try to give `visit` to the pool; returns it back when walked here
    fn try_fork(&self, visit: Visit) -> Option<Visit> {
        let Some(fork) = &self.fork else {
            return Some(visit);
        };
        if !visit.node.is_folderish() || visit.import_root || !fork.need_fork() {
            return Some(visit);
        }

        fork.metrics.schedule();
        let branch = Branch {
            node: visit.node.clone(),
            parent_path: visit.parent_path.clone(),
        };
        match fork.forks.try_send(branch) {
            Ok(()) => {
                fork.metrics.record_fork();
                debug!(node = visit.node.source_path(), "Forked branch");
                None
            }
            Err(_) => {
                // pool gone, keep walking here
                fork.metrics.unschedule();
                Some(visit)
            }
        }
    }

    fn message_for(&self, visit: &Visit, path: &str) -> Result<Option<Message>, IngestError> {
        let node = visit.node.as_ref();
        if visit.import_root && node.is_folderish() {
            return Ok(None);
        }

        let blob = node.blob()?;
        let message = match (self.kind, blob) {
            (LogKind::Document, blob) => Some(Message::Document(document(
                node,
                &visit.parent_path,
                blob.as_ref().map(blob_info),
            ))),
            (LogKind::Blob, Some(blob)) => Some(Message::Blob(blob_message(blob))),
            (LogKind::BlobInfo, Some(blob)) => Some(Message::BlobInfo(blob_info(&blob))),
            (_, None) => None,
        };
        trace!(path, emitted = message.is_some(), "Visited node");
        Ok(message)
    }
}

impl Iterator for TreeProducer {
    type Item = Result<Message, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.token.is_cancelled() {
                self.stack.clear();
                return None;
            }

            let visit = self.stack.pop()?;
            // the branch root is always walked by its own worker
            let visit = if self.visited == 0 {
                visit
            } else {
                match self.try_fork(visit) {
                    Some(visit) => visit,
                    None => continue,
                }
            };
            self.visited += 1;

            let path = if visit.import_root {
                visit.parent_path.clone()
            } else {
                join_path(&visit.parent_path, visit.node.name())
            };

            let pending = self.stack.len();
            if visit.node.is_folderish() {
                let children = match visit.node.children() {
                    Ok(children) => children,
                    Err(e) => return Some(Err(e)),
                };
                // reversed so the first child is walked first
                for child in children.into_iter().rev() {
                    self.stack.push(Visit {
                        node: child,
                        parent_path: path.clone(),
                        import_root: false,
                    });
                }
            }

            match self.message_for(&visit, &path) {
                Ok(Some(message)) => {
                    if let Some(fork) = &self.fork {
                        fork.metrics.record_produced();
                    }
                    return Some(Ok(message));
                }
                Ok(None) => continue,
                Err(e) => {
                    // the node's children go with it
                    self.stack.truncate(pending);
                    return Some(Err(e));
                }
            }
        }
    }
}

impl ProducerIterator for TreeProducer {}

impl Drop for TreeProducer {
    fn drop(&mut self) {
        // releases the fork sender and pending nodes
        debug!(
            visited = self.visited,
            abandoned = self.stack.len(),
            "Tree producer closed"
        );
    }
}

/// `parent/name`, without doubling the separator
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Content digest, lowercase hex sha256
pub fn digest(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

fn blob_info(blob: &SourceBlob) -> BlobInfoMessage {
    let digest = digest(&blob.content);
    BlobInfoMessage {
        key: digest.clone(),
        digest,
        length: blob.content.len() as u64,
        mime_type: blob.mime_type.clone(),
        encoding: blob.encoding.clone(),
        filename: Some(blob.filename.clone()),
    }
}

fn blob_message(blob: SourceBlob) -> BlobMessage {
    BlobMessage {
        key: digest(&blob.content),
        filename: Some(blob.filename),
        mime_type: blob.mime_type,
        encoding: blob.encoding,
        content: blob.content,
    }
}

fn document(node: &dyn SourceNode, parent_path: &str, blob: Option<BlobInfoMessage>) -> DocumentMessage {
    let doc_type = if node.is_folderish() { "Folder" } else { "File" };
    DocumentMessage {
        doc_type: doc_type.to_string(),
        parent_path: parent_path.to_string(),
        name: node.name().to_string(),
        properties: BTreeMap::from([
            ("dc:title".to_string(), node.name().to_string()),
            ("dc:source".to_string(), node.source_path().to_string()),
        ]),
        blob,
    }
}
