//! MessageSink trait - consumer output interface
//!
//! The narrow seam to the target store (document repository).

use crate::{EntityId, Message, SinkError};

/// Target store that decoded messages are applied to.
///
/// Delivery is at-least-once: applying the same message twice must leave
/// the store as if it had been applied once.
#[trait_variant::make(MessageSink: Send)]
pub trait LocalMessageSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Durably create or update the entity described by `message`
    ///
    /// # Errors
    /// `SinkError::Transient` is retried with backoff by the caller,
    /// `SinkError::Rejected` is not.
    async fn apply(&mut self, message: &Message) -> Result<EntityId, SinkError>;

    /// Flush buffered writes (if any)
    async fn flush(&mut self) -> Result<(), SinkError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), SinkError>;
}
