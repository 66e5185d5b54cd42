//! Connection registry: read-only queries over the host's room state.

use crate::connection::ConnectionId;
use parking_lot::RwLock;
use roomgate_protocol::{StatelessSink, UserIdentity};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A connection as exposed by the host.
#[derive(Clone)]
pub struct ConnectionInfo {
    /// Connection ID.
    pub id: ConnectionId,
    /// Room ID.
    pub room: String,
    /// The connection may not change the document.
    pub read_only: bool,
    /// Authenticated identity, if any.
    pub identity: Option<UserIdentity>,
    /// Stateless send primitive of the connection.
    pub sink: Arc<dyn StatelessSink>,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("id", &self.id)
            .field("room", &self.room)
            .field("read_only", &self.read_only)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Query surface over the connections of each room.
///
/// Unknown rooms have no connections; no query is an error.
pub trait ConnectionRegistry: Send + Sync {
    /// All connections of a room.
    fn connections(&self, room: &str) -> Vec<ConnectionInfo>;

    /// Read-only connections of a room.
    fn read_only_connections(&self, room: &str) -> Vec<ConnectionInfo> {
        self.connections(room)
            .into_iter()
            .filter(|c| c.read_only)
            .collect()
    }

    /// Connections of a room that may edit.
    fn collaborator_connections(&self, room: &str) -> Vec<ConnectionInfo> {
        self.connections(room)
            .into_iter()
            .filter(|c| !c.read_only)
            .collect()
    }

    /// Number of collaborators in a room other than `excluding`.
    fn collaborator_count(&self, room: &str, excluding: ConnectionId) -> usize {
        self.collaborator_connections(room)
            .iter()
            .filter(|c| c.id != excluding)
            .count()
    }
}

/// An in-process registry, partitioned by room.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    rooms: RwLock<HashMap<String, Vec<ConnectionInfo>>>,
}

impl InMemoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection. Returns true if it is the first one of its room.
    pub fn insert(&self, info: ConnectionInfo) -> bool {
        let mut rooms = self.rooms.write();
        let connections = rooms.entry(info.room.clone()).or_default();
        connections.retain(|c| c.id != info.id);
        connections.push(info);
        connections.len() == 1
    }

    /// Replaces the stored snapshot of a connection.
    pub fn update(&self, info: ConnectionInfo) {
        let mut rooms = self.rooms.write();
        if let Some(existing) = rooms
            .get_mut(&info.room)
            .and_then(|connections| connections.iter_mut().find(|c| c.id == info.id))
        {
            *existing = info;
        }
    }

    /// Removes a connection. Returns true if its room is now empty.
    pub fn remove(&self, room: &str, id: ConnectionId) -> bool {
        let mut rooms = self.rooms.write();
        let Some(connections) = rooms.get_mut(room) else {
            return false;
        };
        connections.retain(|c| c.id != id);
        if connections.is_empty() {
            rooms.remove(room);
            return true;
        }
        false
    }

    /// Rooms with at least one connection.
    pub fn rooms(&self) -> Vec<String> {
        self.rooms.read().keys().cloned().collect()
    }

    /// Total number of connections.
    pub fn len(&self) -> usize {
        self.rooms.read().values().map(Vec::len).sum()
    }

    /// Returns true if there are no connections.
    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }
}

impl ConnectionRegistry for InMemoryRegistry {
    fn connections(&self, room: &str) -> Vec<ConnectionInfo> {
        self.rooms.read().get(room).cloned().unwrap_or_default()
    }
}
