//! Error types for backend calls.

use roomgate_protocol::{EventPattern, MessagePattern, ProtocolError};
use thiserror::Error;

/// Result type for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Errors that can occur while calling the backend.
///
/// Broker-specific failures are mapped onto these variants by the transport
/// before they reach the sender, so callers never see broker error shapes.
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    /// No response arrived within the per-call timeout.
    #[error("{pattern} request timed out after {elapsed_ms}ms")]
    Timeout {
        /// Pattern of the request.
        pattern: MessagePattern,
        /// Time spent waiting for the response.
        elapsed_ms: u64,
    },

    /// An event was not accepted by the broker within the per-call timeout.
    /// Events are published once and never retried.
    #[error("{event} event not accepted within {elapsed_ms}ms")]
    EmitTimeout {
        /// Pattern of the event.
        event: EventPattern,
        /// Time spent waiting for the broker.
        elapsed_ms: u64,
    },

    /// Every attempt failed.
    #[error("{pattern} request failed after {retries} retries: {source}")]
    RetryExhausted {
        /// Pattern of the request.
        pattern: MessagePattern,
        /// Configured number of retries.
        retries: u32,
        /// Error of the last attempt.
        source: Box<RpcError>,
    },

    /// The broker connection failed. Not retried by the sender.
    #[error("broker connection error: {0}")]
    Connection(String),

    /// The broker connection was never established or has been closed.
    #[error("not connected to the message broker")]
    NotConnected,

    /// The backend answered with an error.
    #[error("backend error: {0}")]
    Remote(String),

    /// The request or the response could not be (de)serialized.
    #[error("codec error: {0}")]
    Codec(String),
}

impl RpcError {
    /// Returns true if the sender should retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Timeout { .. } | RpcError::Remote(_))
    }

    /// Returns the error of the last attempt, unwrapping `RetryExhausted`.
    pub fn root_cause(&self) -> &RpcError {
        match self {
            RpcError::RetryExhausted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<ProtocolError> for RpcError {
    fn from(err: ProtocolError) -> Self {
        RpcError::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(RpcError::Timeout {
            pattern: MessagePattern::Who,
            elapsed_ms: 10
        }
        .is_retryable());
        assert!(RpcError::Remote("busy".into()).is_retryable());
        assert!(!RpcError::Connection("refused".into()).is_retryable());
        assert!(!RpcError::NotConnected.is_retryable());
        assert!(!RpcError::Codec("bad json".into()).is_retryable());
        assert!(!RpcError::EmitTimeout {
            event: EventPattern::Contributions,
            elapsed_ms: 10
        }
        .is_retryable());
    }

    #[test]
    fn error_display() {
        let err = RpcError::Timeout {
            pattern: MessagePattern::Info,
            elapsed_ms: 250,
        };
        assert_eq!(err.to_string(), "INFO request timed out after 250ms");

        let err = RpcError::RetryExhausted {
            pattern: MessagePattern::Save,
            retries: 3,
            source: Box::new(RpcError::Remote("down".into())),
        };
        assert!(err.to_string().contains("SAVE"));
        assert!(err.to_string().contains("3 retries"));
        assert!(matches!(err.root_cause(), RpcError::Remote(_)));
    }
}
