//! Error types for the protocol layer.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A value could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),

    /// A value could not be deserialized.
    #[error("decode error: {0}")]
    Decode(String),

    /// Document content was not valid base64.
    #[error("invalid document content: {0}")]
    InvalidContent(String),
}

impl ProtocolError {
    pub(crate) fn encode(err: impl std::fmt::Display) -> Self {
        Self::Encode(err.to_string())
    }

    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}
