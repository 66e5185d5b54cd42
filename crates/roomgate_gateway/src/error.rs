//! Error types for the gateway.

use crate::context::ContextField;
use roomgate_protocol::ProtocolError;
use thiserror::Error;

/// Result type for hook invocations.
pub type HookResult<T> = Result<T, HookError>;

/// Errors raised by extension hooks.
///
/// A hook error aborts the remaining extensions of that hook for that
/// connection or room only, and the host closes the socket of the
/// connection it was raised for.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HookError {
    /// The explicit credential message did not authenticate the connection.
    #[error("authentication failed for room '{room}': {reason}")]
    AuthenticationFailure {
        /// Room the connection targets.
        room: String,
        /// Why the credential was refused.
        reason: String,
    },

    /// The user may not read the document.
    #[error("user '{user}' may not read room '{room}'")]
    Forbidden {
        /// User ID.
        user: String,
        /// Room ID.
        room: String,
    },

    /// Loading or storing the document failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// An extension refused the hook.
    #[error("rejected by {extension}: {reason}")]
    Rejected {
        /// Name of the extension.
        extension: String,
        /// Reason given by the extension.
        reason: String,
    },

    /// A wire payload could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl HookError {
    /// Returns true for authentication and authorization failures.
    pub fn is_access_denied(&self) -> bool {
        matches!(
            self,
            HookError::AuthenticationFailure { .. } | HookError::Forbidden { .. }
        )
    }
}

/// Errors raised while composing a pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// An extension reads a context field that no higher-priority extension writes.
    #[error("extension '{extension}' reads {field} but no earlier extension writes it")]
    UnsatisfiedRead {
        /// Name of the extension.
        extension: String,
        /// The unsatisfied field.
        field: ContextField,
    },

    /// Two extensions share a name.
    #[error("duplicate extension name: {0}")]
    DuplicateExtension(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading the gateway configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration document is malformed.
    #[error("invalid configuration document: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}
