//! Connections as seen by the pipeline.

use crate::context::ConnectionContext;
use crate::registry::ConnectionInfo;
use roomgate_protocol::{StatelessMessage, StatelessSink, WhoRequest};
use std::fmt;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// Unique identifier of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a new random ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Credentials present on the upgrade request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Raw `Cookie` header.
    pub cookie: Option<String>,
    /// Raw `Authorization` header.
    pub authorization: Option<String>,
}

impl Credentials {
    /// No credentials.
    pub fn none() -> Self {
        Self::default()
    }

    /// Cookie credentials.
    pub fn cookie(cookie: impl Into<String>) -> Self {
        Self {
            cookie: Some(cookie.into()),
            authorization: None,
        }
    }

    /// Bearer token credentials.
    pub fn bearer(token: &str) -> Self {
        Self {
            cookie: None,
            authorization: Some(format!("Bearer {token}")),
        }
    }

    /// The identity lookup to perform, if any.
    ///
    /// The authorization header wins over the cookie when a proxy forwards
    /// both; only the winning credential is sent.
    pub fn preferred(&self) -> Option<WhoRequest> {
        if let Some(authorization) = self.authorization.as_deref().filter(|a| !a.is_empty()) {
            return Some(WhoRequest::with_authorization(authorization));
        }
        self.cookie
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(WhoRequest::with_cookie)
    }
}

/// A connection moving through the hook sequence.
///
/// Owned by the host transport; hooks receive it mutably so later
/// extensions observe the writes of earlier ones.
pub struct ConnectionHandle {
    id: ConnectionId,
    room: String,
    credentials: Credentials,
    sink: Arc<dyn StatelessSink>,
    connected: bool,
    /// The connection may not change the document.
    pub read_only: bool,
    /// Accumulated context.
    pub context: ConnectionContext,
}

impl ConnectionHandle {
    /// Creates a pending connection. It is read-only until authorized.
    pub fn new(
        room: impl Into<String>,
        credentials: Credentials,
        sink: Arc<dyn StatelessSink>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            room: room.into(),
            credentials,
            sink,
            connected: false,
            read_only: true,
            context: ConnectionContext::new(),
        }
    }

    /// Returns the connection ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the room the connection targets.
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Returns the upgrade request credentials.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Returns the stateless send primitive.
    pub fn sink(&self) -> &Arc<dyn StatelessSink> {
        &self.sink
    }

    /// Returns true once `connected` was dispatched.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn mark_connected(&mut self) {
        self.connected = true;
    }

    /// Sends a stateless message. Failures are logged, never propagated.
    pub fn send_stateless(&self, message: &StatelessMessage) -> bool {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(err) => {
                error!(connection = %self.id, event = message.event(), error = %err, "failed to encode stateless message");
                return false;
            }
        };
        match self.sink.send_stateless(&payload) {
            Ok(()) => true,
            Err(err) => {
                error!(connection = %self.id, room = %self.room, error = %err, "failed to send stateless message");
                false
            }
        }
    }

    /// Snapshot for the connection registry.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            room: self.room.clone(),
            read_only: self.read_only,
            identity: self.context.identity().cloned(),
            sink: self.sink.clone(),
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("room", &self.room)
            .field("read_only", &self.read_only)
            .field("connected", &self.connected)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
