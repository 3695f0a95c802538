//! # Contracts
//!
//! Frozen interface contracts shared by every pipeline crate: messages,
//! log records, the error taxonomy and the producer/sink seams.
//! Business crates depend on this crate, never the other way around.
//!
//! ## Ordering Model
//! - Every message has an ordering key; [`partition_for_key`] maps it to a
//!   partition deterministically
//! - Order is total within a partition and undefined across partitions

mod blueprint;
mod entity_id;
mod error;
mod message;
mod producer;
mod record;
mod sink;

pub use blueprint::*;
pub use entity_id::EntityId;
pub use error::*;
pub use message::*;
pub use producer::{ProducerIterator, SourceBlob, SourceNode};
pub use record::*;
pub use sink::*;
