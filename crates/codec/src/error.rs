//! Codec error types

use thiserror::Error;

/// Codec-specific errors
#[derive(Debug, Error)]
pub enum CodecError {
    /// Bytes do not decode to a message
    #[error("codec '{codec}' cannot decode record: {message}")]
    Corrupt {
        codec: &'static str,
        message: String,
    },

    /// Serializer internal failure
    #[error("codec '{codec}' cannot encode message: {message}")]
    Encode {
        codec: &'static str,
        message: String,
    },
}

impl CodecError {
    pub fn corrupt(codec: &'static str, message: impl ToString) -> Self {
        Self::Corrupt {
            codec,
            message: message.to_string(),
        }
    }

    pub fn encode(codec: &'static str, message: impl ToString) -> Self {
        Self::Encode {
            codec,
            message: message.to_string(),
        }
    }
}
