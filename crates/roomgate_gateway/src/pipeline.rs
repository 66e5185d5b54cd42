//! Extension pipeline coordinator.
//!
//! Extensions are given priorities from their construction order: with `n`
//! extensions, the one at index `i` gets priority `n - i`, so the first
//! listed runs first. Every hook is dispatched in descending priority to
//! the extensions that implement it, and a hook error stops the dispatch of
//! that hook for that connection or room only.

use crate::connection::ConnectionHandle;
use crate::context::{ConnectionContext, ContextField};
use crate::error::{HookError, HookResult, PipelineError};
use crate::extension::{Extension, Hook, LoadContext, StoreContext};
use crate::registry::ConnectionInfo;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Outcome of the `onConnect` sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The connection was authenticated at connect time.
    Established,
    /// The connection waits for an explicit credential message.
    AwaitingAuthentication,
}

struct Registered {
    priority: usize,
    extension: Arc<dyn Extension>,
}

/// Ordered list of extensions and the hook dispatcher.
pub struct Pipeline {
    extensions: Vec<Registered>,
    open_rooms: Mutex<HashSet<String>>,
}

impl Pipeline {
    /// Composes a pipeline from extensions listed in priority order.
    ///
    /// Fails if two extensions share a name, or if an extension reads a
    /// context field that no higher-priority extension writes.
    pub fn new(extensions: Vec<Arc<dyn Extension>>) -> Result<Self, PipelineError> {
        let count = extensions.len();
        let mut extensions: Vec<Registered> = extensions
            .into_iter()
            .enumerate()
            .map(|(index, extension)| Registered {
                priority: count - index,
                extension,
            })
            .collect();
        extensions.sort_by(|a, b| b.priority.cmp(&a.priority));

        validate(&extensions)?;
        Ok(Self {
            extensions,
            open_rooms: Mutex::new(HashSet::new()),
        })
    }

    /// Extension names with their priorities, in dispatch order.
    pub fn priorities(&self) -> Vec<(&'static str, usize)> {
        self.extensions
            .iter()
            .map(|r| (r.extension.name(), r.priority))
            .collect()
    }

    /// Extensions implementing `hook`, in dispatch order.
    pub fn dispatch_order(&self, hook: Hook) -> Vec<&'static str> {
        self.implementing(hook).map(|e| e.name()).collect()
    }

    fn implementing(&self, hook: Hook) -> impl Iterator<Item = &Arc<dyn Extension>> {
        self.extensions
            .iter()
            .map(|r| &r.extension)
            .filter(move |e| e.hooks().contains(hook))
    }

    /// Runs `onConnect`.
    pub async fn handle_connect(
        &self,
        connection: &mut ConnectionHandle,
    ) -> HookResult<ConnectOutcome> {
        for extension in self.implementing(Hook::OnConnect) {
            if let Err(err) = extension.on_connect(connection).await {
                log_rejection(Hook::OnConnect, extension.name(), connection, &err);
                return Err(err);
            }
        }
        if connection.context.auth.is_authenticated() {
            Ok(ConnectOutcome::Established)
        } else {
            Ok(ConnectOutcome::AwaitingAuthentication)
        }
    }

    /// Runs `onAuthenticate` with the token of the credential message.
    ///
    /// Fails with `AuthenticationFailure` if no extension authenticated
    /// the connection.
    pub async fn handle_authenticate(
        &self,
        connection: &mut ConnectionHandle,
        token: &str,
    ) -> HookResult<()> {
        for extension in self.implementing(Hook::OnAuthenticate) {
            if let Err(err) = extension.on_authenticate(connection, token).await {
                log_rejection(Hook::OnAuthenticate, extension.name(), connection, &err);
                return Err(err);
            }
        }
        if connection.context.auth.is_authenticated() {
            Ok(())
        } else {
            Err(HookError::AuthenticationFailure {
                room: connection.room().to_string(),
                reason: "no extension authenticated the connection".into(),
            })
        }
    }

    /// Runs `connected` once for an authenticated connection.
    ///
    /// Returns false without dispatching if the connection is not
    /// authenticated or was already connected.
    pub async fn connected(&self, connection: &mut ConnectionHandle) -> bool {
        if !connection.context.auth.is_authenticated() || connection.is_connected() {
            return false;
        }
        connection.mark_connected();
        for extension in self.implementing(Hook::Connected) {
            extension.connected(connection).await;
        }
        true
    }

    /// Runs `onChange`.
    pub fn dispatch_change(&self, room: &str, context: &ConnectionContext) {
        for extension in self.implementing(Hook::OnChange) {
            extension.on_change(room, context);
        }
    }

    /// Runs `onRoomOpen` unless the room is already open.
    pub async fn open_room(&self, room: &str) -> bool {
        if !self.open_rooms.lock().insert(room.to_string()) {
            error!(room, "room opened twice; ignoring");
            return false;
        }
        for extension in self.implementing(Hook::OnRoomOpen) {
            extension.on_room_open(room).await;
        }
        true
    }

    /// Runs `onRoomClose` if the room is open.
    pub async fn close_room(&self, room: &str) -> bool {
        if !self.open_rooms.lock().remove(room) {
            error!(room, "closing a room that is not open; ignoring");
            return false;
        }
        for extension in self.implementing(Hook::OnRoomClose) {
            extension.on_room_close(room).await;
        }
        true
    }

    /// Returns true if the room is open.
    pub fn is_room_open(&self, room: &str) -> bool {
        self.open_rooms.lock().contains(room)
    }

    /// Runs `onLoadDocument` and returns the loaded state, if any.
    pub async fn load_document(&self, room: &str) -> HookResult<Option<Vec<u8>>> {
        let mut load = LoadContext::new(room);
        for extension in self.implementing(Hook::OnLoadDocument) {
            if let Err(err) = extension.on_load_document(&mut load).await {
                warn!(room, extension = extension.name(), error = %err, "document load failed");
                return Err(err);
            }
        }
        Ok(load.state)
    }

    /// Runs `onStoreDocument`, then `afterStoreDocument` with `connections`.
    pub async fn store_document(
        &self,
        room: &str,
        state: Vec<u8>,
        connections: &[ConnectionInfo],
    ) -> HookResult<StoreContext> {
        let mut store = StoreContext::new(room, state);
        for extension in self.implementing(Hook::OnStoreDocument) {
            if let Err(err) = extension.on_store_document(&mut store).await {
                warn!(room, extension = extension.name(), error = %err, "document store failed");
                return Err(err);
            }
        }
        for extension in self.implementing(Hook::AfterStoreDocument) {
            if let Err(err) = extension.after_store_document(&store, connections).await {
                warn!(room, extension = extension.name(), error = %err, "after-store hook failed");
                return Err(err);
            }
        }
        debug!(room, saved = store.saved, "document stored");
        Ok(store)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("extensions", &self.priorities())
            .finish_non_exhaustive()
    }
}

fn validate(extensions: &[Registered]) -> Result<(), PipelineError> {
    let mut names = HashSet::new();
    let mut written: HashSet<ContextField> = HashSet::new();

    for registered in extensions {
        let extension = &registered.extension;
        if !names.insert(extension.name()) {
            return Err(PipelineError::DuplicateExtension(extension.name().into()));
        }
        let access = extension.context_access();
        if let Some(field) = access.reads.iter().find(|f| !written.contains(*f)) {
            return Err(PipelineError::UnsatisfiedRead {
                extension: extension.name().into(),
                field: *field,
            });
        }
        written.extend(access.writes.iter().copied());
    }
    Ok(())
}

fn log_rejection(hook: Hook, extension: &str, connection: &ConnectionHandle, err: &HookError) {
    warn!(
        %hook,
        extension,
        connection = %connection.id(),
        room = connection.room(),
        error = %err,
        "hook rejected the connection"
    );
}
