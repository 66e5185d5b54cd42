//! Stateless messages delivered to clients outside the CRDT sync stream.

use crate::access::ReadOnlyCode;
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};

/// An out-of-band status message, JSON-encoded and tagged on `event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum StatelessMessage {
    /// The resolved read-only state of the receiving connection.
    #[serde(rename = "read-only-state", rename_all = "camelCase")]
    ReadOnlyState {
        /// Whether the connection may edit.
        read_only: bool,
        /// Why the connection is read-only, if it is.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        read_only_code: Option<ReadOnlyCode>,
    },
    /// The document was stored.
    #[serde(rename = "saved")]
    Saved,
    /// The document could not be stored.
    #[serde(rename = "save-error")]
    SaveError {
        /// Error message from the backend.
        error: String,
    },
}

impl StatelessMessage {
    /// Creates a read-only state message.
    pub fn read_only_state(read_only: bool, read_only_code: Option<ReadOnlyCode>) -> Self {
        Self::ReadOnlyState {
            read_only,
            read_only_code,
        }
    }

    /// Returns the `event` tag.
    pub fn event(&self) -> &'static str {
        match self {
            StatelessMessage::ReadOnlyState { .. } => "read-only-state",
            StatelessMessage::Saved => "saved",
            StatelessMessage::SaveError { .. } => "save-error",
        }
    }

    /// Encodes to the JSON text sent to clients.
    pub fn encode(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(ProtocolError::encode)
    }

    /// Decodes from JSON text.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        serde_json::from_str(text).map_err(ProtocolError::decode)
    }
}

/// The transport's stateless send primitive for a single connection.
///
/// Implemented by the host WebSocket transport. Sending is fire-and-forget;
/// an `Err` only reports that the payload could not be handed to the socket.
pub trait StatelessSink: Send + Sync {
    /// Sends an already encoded stateless payload.
    fn send_stateless(&self, payload: &str) -> Result<(), String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn to_json(message: &StatelessMessage) -> Value {
        serde_json::from_str(&message.encode().unwrap()).unwrap()
    }

    #[test]
    fn read_only_state_without_code() {
        let message = StatelessMessage::read_only_state(false, None);
        assert_eq!(
            to_json(&message),
            json!({"event": "read-only-state", "readOnly": false})
        );
    }

    #[test]
    fn read_only_state_with_code() {
        let message =
            StatelessMessage::read_only_state(true, Some(ReadOnlyCode::MultiUserNotAllowed));
        assert_eq!(
            to_json(&message),
            json!({
                "event": "read-only-state",
                "readOnly": true,
                "readOnlyCode": "multi_user_not_allowed"
            })
        );
    }

    #[test]
    fn save_messages() {
        assert_eq!(to_json(&StatelessMessage::Saved), json!({"event": "saved"}));
        assert_eq!(
            to_json(&StatelessMessage::SaveError {
                error: "timeout".into()
            }),
            json!({"event": "save-error", "error": "timeout"})
        );
    }

    #[test]
    fn decode_client_side() {
        let message = StatelessMessage::decode(
            r#"{"event":"read-only-state","readOnly":true,"readOnlyCode":"room_capacity_reached"}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            StatelessMessage::read_only_state(true, Some(ReadOnlyCode::RoomCapacityReached))
        );
        assert_eq!(message.event(), "read-only-state");
    }

    #[test]
    fn decode_unknown_event() {
        assert!(StatelessMessage::decode(r#"{"event":"cursor"}"#).is_err());
    }
}
