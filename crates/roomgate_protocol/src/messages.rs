//! RPC messages exchanged with the backend over the message broker.
//!
//! Every request carries a pattern from the closed [`MessagePattern`] set and
//! a JSON payload. Fire-and-forget notifications use [`EventPattern`] instead
//! and expect no response.

use crate::access::UserIdentity;
use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload sent with every `HEALTH_CHECK` request.
pub const HEALTH_CHECK_PAYLOAD: &str = "healthy?";

/// Request/response patterns understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessagePattern {
    /// Identity lookup from a cookie or authorization header.
    Who,
    /// Permission lookup for a user on a document.
    Info,
    /// Load document content.
    Fetch,
    /// Store document content.
    Save,
    /// Broker round-trip health check.
    HealthCheck,
}

impl MessagePattern {
    /// All request patterns.
    pub const ALL: [MessagePattern; 5] = [
        MessagePattern::Who,
        MessagePattern::Info,
        MessagePattern::Fetch,
        MessagePattern::Save,
        MessagePattern::HealthCheck,
    ];

    /// Returns the wire tag of the pattern.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessagePattern::Who => "WHO",
            MessagePattern::Info => "INFO",
            MessagePattern::Fetch => "FETCH",
            MessagePattern::Save => "SAVE",
            MessagePattern::HealthCheck => "HEALTH_CHECK",
        }
    }
}

impl fmt::Display for MessagePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fire-and-forget event patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPattern {
    /// Users who contributed to a document during the last window.
    Contributions,
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventPattern::Contributions => f.write_str("CONTRIBUTIONS"),
        }
    }
}

/// A request envelope: `{pattern, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Request pattern.
    pub pattern: MessagePattern,
    /// JSON payload.
    pub payload: serde_json::Value,
}

impl RpcRequest {
    /// Builds an envelope from a typed payload.
    pub fn new<T: Serialize + ?Sized>(pattern: MessagePattern, payload: &T) -> ProtocolResult<Self> {
        let payload = serde_json::to_value(payload).map_err(ProtocolError::encode)?;
        Ok(Self { pattern, payload })
    }

    /// Decodes the payload into a typed value.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        serde_json::from_value(self.payload.clone()).map_err(ProtocolError::decode)
    }
}

/// An event envelope: `{pattern, payload}` with no response expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcEvent {
    /// Event pattern.
    pub pattern: EventPattern,
    /// JSON payload.
    pub payload: serde_json::Value,
}

impl RpcEvent {
    /// Builds an event envelope from a typed payload.
    pub fn new<T: Serialize + ?Sized>(pattern: EventPattern, payload: &T) -> ProtocolResult<Self> {
        let payload = serde_json::to_value(payload).map_err(ProtocolError::encode)?;
        Ok(Self { pattern, payload })
    }

    /// Decodes the payload into a typed value.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        serde_json::from_value(self.payload.clone()).map_err(ProtocolError::decode)
    }
}

/// `WHO` request: the credentials forwarded by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoRequest {
    /// Raw `Cookie` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
    /// Raw `Authorization` header (`Bearer <token>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
}

impl WhoRequest {
    /// Creates a cookie-only request.
    pub fn with_cookie(cookie: impl Into<String>) -> Self {
        Self {
            cookie: Some(cookie.into()),
            authorization: None,
        }
    }

    /// Creates an authorization-only request.
    pub fn with_authorization(authorization: impl Into<String>) -> Self {
        Self {
            cookie: None,
            authorization: Some(authorization.into()),
        }
    }
}

/// `INFO` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoRequest {
    /// User ID.
    pub user_id: String,
    /// Document (room) ID.
    pub document_id: String,
}

/// `FETCH` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    /// Document (room) ID.
    pub document_id: String,
}

/// Error codes of a failed `FETCH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorCode {
    /// The document does not exist.
    NotFound,
    /// The backend or the transport failed.
    InternalError,
}

/// `FETCH` response: either the content or a structured error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FetchResponse {
    /// The fetch failed.
    Error {
        /// Error message.
        error: String,
        /// Error code.
        code: FetchErrorCode,
    },
    /// Document content.
    Content {
        /// Base64-encoded document state.
        #[serde(rename = "contentBase64")]
        content_base64: String,
    },
}

impl FetchResponse {
    /// Creates a content response.
    pub fn content(content_base64: impl Into<String>) -> Self {
        Self::Content {
            content_base64: content_base64.into(),
        }
    }

    /// Creates an internal-error response.
    pub fn internal_error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
            code: FetchErrorCode::InternalError,
        }
    }

    /// Creates a not-found response.
    pub fn not_found(document_id: &str) -> Self {
        Self::Error {
            error: format!("document '{document_id}' not found"),
            code: FetchErrorCode::NotFound,
        }
    }

    /// Returns true if this is an error response.
    pub fn is_error(&self) -> bool {
        matches!(self, FetchResponse::Error { .. })
    }
}

/// `SAVE` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    /// Document (room) ID.
    pub document_id: String,
    /// Base64-encoded document state.
    pub content_base64: String,
}

/// `SAVE` response: `{}` on success, `{error}` on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResponse {
    /// Error message if the save failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SaveResponse {
    /// A successful save.
    pub fn saved() -> Self {
        Self { error: None }
    }

    /// A failed save.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
        }
    }

    /// Returns true if the document was saved.
    pub fn is_saved(&self) -> bool {
        self.error.is_none()
    }
}

/// `HEALTH_CHECK` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Whether the backend considers itself healthy.
    pub healthy: bool,
}

/// Payload of the [`EventPattern::Contributions`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionsEvent {
    /// Document (room) ID.
    pub document_id: String,
    /// Users who changed the document during the window.
    pub users: Vec<UserIdentity>,
}
