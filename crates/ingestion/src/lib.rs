//! # Ingestion
//!
//! Producer side of the pipeline.
//!
//! Responsibilities:
//! - Walk a source tree lazily and emit one message per node
//! - Route each message to its partition and append it with retry
//! - Fork subtrees to extra workers while the fork policy allows it
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{LogAppender, ProducerPoolBuilder, SyntheticSourceNode};
//!
//! let appender = LogAppender::new(log, codec, retry, token.clone());
//! let report = ProducerPoolBuilder::new(appender)
//!     .batch_size(50)
//!     .log_kind(LogKind::Document)
//!     .cancellation(token)
//!     .build()
//!     .run(Arc::new(SyntheticSourceNode::root(3, 3, 1024)))
//!     .await?;
//! ```

mod appender;
mod fork;
mod metrics;
mod pool;
mod producer;
mod source;

// Re-exports
pub use appender::LogAppender;
pub use fork::{
    fork_policy, fork_policy_names, AdaptiveForkPolicy, ForkPolicy, SequentialPolicy,
};
pub use crate::metrics::{ProducerMetrics, ProducerReport};
pub use pool::{ProducerPool, ProducerPoolBuilder};
pub use producer::{digest, join_path, Branch, ForkContext, TreeProducer};
pub use source::{source_root, FileSourceNode, SyntheticSourceNode};
