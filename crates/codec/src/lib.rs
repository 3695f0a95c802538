//! # Codec
//!
//! Pluggable message serialization.
//!
//! - [`Codec`]: stateless, bidirectional `Message` <-> bytes mapping
//! - [`CodecRegistry`]: compile-time table from names and wire ids to codecs
//!
//! Every appended record carries the id of the codec that produced it, so
//! a reader can always pick the right decoder.
//!
//! ```
//! use codec::{CodecRegistry, DEFAULT_CODEC};
//!
//! let registry = CodecRegistry::builtin();
//! let codec = registry.get(DEFAULT_CODEC).unwrap();
//! assert_eq!(codec.name(), "bincode");
//! ```

mod bincode_codec;
mod error;
mod json_codec;
mod registry;

pub use bincode_codec::BincodeCodec;
pub use contracts::DEFAULT_CODEC;
pub use error::CodecError;
pub use json_codec::JsonCodec;
pub use registry::{CodecFactory, CodecRegistry};

use contracts::Message;

/// Message serializer/deserializer.
///
/// Round-trip law: `decode(&encode(m)?) == m` for every message `m`.
pub trait Codec: Send + Sync {
    /// Registry name
    fn name(&self) -> &'static str;

    /// Wire id stored in each record header
    fn id(&self) -> u8;

    /// Serialize a message.
    ///
    /// Never fails for a structurally valid message; the `Result` only
    /// carries serializer internals.
    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError>;

    /// Deserialize a message
    ///
    /// # Errors
    /// `CodecError::Corrupt` on malformed bytes
    fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError>;
}
