//! The extension capability set.
//!
//! An extension implements any subset of the hooks and declares that
//! subset through [`Extension::hooks`]. The pipeline only dispatches a hook
//! to the extensions that declare it.

use crate::connection::ConnectionHandle;
use crate::context::{ConnectionContext, ContextAccess};
use crate::error::HookResult;
use crate::registry::ConnectionInfo;
use async_trait::async_trait;
use std::fmt;

/// Hook points of the connection and room lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Socket opened; only upgrade-request credentials are available.
    OnConnect,
    /// The client sent an explicit credential message.
    OnAuthenticate,
    /// The connection is authenticated and authorized.
    Connected,
    /// The document changed.
    OnChange,
    /// First connection of a room.
    OnRoomOpen,
    /// Last connection of a room left.
    OnRoomClose,
    /// The document must be loaded.
    OnLoadDocument,
    /// The document must be stored.
    OnStoreDocument,
    /// The document store completed.
    AfterStoreDocument,
}

impl Hook {
    /// All hooks, in lifecycle order.
    pub const ALL: [Hook; 9] = [
        Hook::OnConnect,
        Hook::OnAuthenticate,
        Hook::Connected,
        Hook::OnChange,
        Hook::OnRoomOpen,
        Hook::OnRoomClose,
        Hook::OnLoadDocument,
        Hook::OnStoreDocument,
        Hook::AfterStoreDocument,
    ];

    fn bit(self) -> u16 {
        1 << (self as u16)
    }

    /// Returns the hook name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::OnConnect => "onConnect",
            Hook::OnAuthenticate => "onAuthenticate",
            Hook::Connected => "connected",
            Hook::OnChange => "onChange",
            Hook::OnRoomOpen => "onRoomOpen",
            Hook::OnRoomClose => "onRoomClose",
            Hook::OnLoadDocument => "onLoadDocument",
            Hook::OnStoreDocument => "onStoreDocument",
            Hook::AfterStoreDocument => "afterStoreDocument",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of hooks.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct HookSet(u16);

impl HookSet {
    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Builds a set from a list of hooks.
    pub fn of(hooks: &[Hook]) -> Self {
        hooks.iter().fold(Self::empty(), |set, hook| set.with(*hook))
    }

    /// Adds a hook.
    pub fn with(self, hook: Hook) -> Self {
        Self(self.0 | hook.bit())
    }

    /// Returns true if the set contains `hook`.
    pub fn contains(&self, hook: Hook) -> bool {
        self.0 & hook.bit() != 0
    }

    /// Iterates over the hooks of the set.
    pub fn iter(&self) -> impl Iterator<Item = Hook> + '_ {
        Hook::ALL.into_iter().filter(|h| self.contains(*h))
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Document state produced by `onLoadDocument`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadContext {
    /// Room ID.
    pub room: String,
    /// Loaded document state. `None` until an extension provides it.
    pub state: Option<Vec<u8>>,
}

impl LoadContext {
    /// Creates an empty load context.
    pub fn new(room: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            state: None,
        }
    }
}

/// Document state and outcome of `onStoreDocument`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreContext {
    /// Room ID.
    pub room: String,
    /// Document state to store.
    pub state: Vec<u8>,
    /// The document was stored.
    pub saved: bool,
    /// Error of the failed store.
    pub error: Option<String>,
}

impl StoreContext {
    /// Creates a store context for the given state.
    pub fn new(room: impl Into<String>, state: Vec<u8>) -> Self {
        Self {
            room: room.into(),
            state,
            saved: false,
            error: None,
        }
    }
}

/// A pipeline extension.
///
/// Every hook has a no-op default; [`Extension::hooks`] must list the ones
/// the extension overrides.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Unique name, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Hooks implemented by the extension.
    fn hooks(&self) -> HookSet;

    /// Context fields the extension reads and writes.
    fn context_access(&self) -> ContextAccess {
        ContextAccess::NONE
    }

    /// Runs when the socket opens. Must not reject merely because the
    /// connection is not authenticated yet.
    async fn on_connect(&self, _connection: &mut ConnectionHandle) -> HookResult<()> {
        Ok(())
    }

    /// Runs when the client sends an explicit credential.
    async fn on_authenticate(
        &self,
        _connection: &mut ConnectionHandle,
        _token: &str,
    ) -> HookResult<()> {
        Ok(())
    }

    /// Runs once the connection is authenticated and authorized.
    async fn connected(&self, _connection: &ConnectionHandle) {}

    /// Runs on every document change. Must not block.
    fn on_change(&self, _room: &str, _context: &ConnectionContext) {}

    /// Runs when the first connection of a room arrives.
    async fn on_room_open(&self, _room: &str) {}

    /// Runs when the last connection of a room leaves.
    async fn on_room_close(&self, _room: &str) {}

    /// Loads the document of a room.
    async fn on_load_document(&self, _load: &mut LoadContext) -> HookResult<()> {
        Ok(())
    }

    /// Stores the document of a room.
    async fn on_store_document(&self, _store: &mut StoreContext) -> HookResult<()> {
        Ok(())
    }

    /// Runs after the store with the connections of the room.
    async fn after_store_document(
        &self,
        _store: &StoreContext,
        _connections: &[ConnectionInfo],
    ) -> HookResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_set_membership() {
        let set = HookSet::of(&[Hook::OnConnect, Hook::Connected]);
        assert!(set.contains(Hook::OnConnect));
        assert!(set.contains(Hook::Connected));
        assert!(!set.contains(Hook::OnChange));
        assert_eq!(set.iter().collect::<Vec<_>>(), [Hook::OnConnect, Hook::Connected]);
        assert_eq!(format!("{set:?}"), "{OnConnect, Connected}");
    }

    #[test]
    fn all_hooks_fit_the_set() {
        let set = HookSet::of(&Hook::ALL);
        assert_eq!(set.iter().count(), Hook::ALL.len());
    }
}
