//! BincodeCodec - compact binary encoding (default)

use contracts::Message;

use crate::{Codec, CodecError};

/// Binary codec backed by `bincode`
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl BincodeCodec {
    pub const NAME: &'static str = "bincode";
    pub const ID: u8 = 1;
}

impl Codec for BincodeCodec {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn id(&self) -> u8 {
        Self::ID
    }

    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(message).map_err(|e| CodecError::encode(Self::NAME, e))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::corrupt(Self::NAME, e))
    }
}
