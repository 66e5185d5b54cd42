//! Document persistence extensions.

use crate::error::{HookError, HookResult};
use crate::extension::{Extension, Hook, HookSet, LoadContext, StoreContext};
use crate::registry::ConnectionInfo;
use async_trait::async_trait;
use parking_lot::RwLock;
use roomgate_protocol::{decode_content, encode_content, FetchResponse, StatelessMessage};
use roomgate_rpc::IntegrationClient;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Loads and stores documents through the backend `FETCH`/`SAVE` patterns.
///
/// Any fetch error, including `NOT_FOUND`, fails the load. Store failures
/// do not fail the hook; they are reported to the connections of the room
/// as a `save-error` message.
#[derive(Debug)]
pub struct DocumentStorage {
    client: Arc<IntegrationClient>,
}

impl DocumentStorage {
    /// Extension name.
    pub const NAME: &'static str = "storage";

    /// Creates a storage extension over the given client.
    pub fn new(client: Arc<IntegrationClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Extension for DocumentStorage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn hooks(&self) -> HookSet {
        HookSet::of(&[
            Hook::OnLoadDocument,
            Hook::OnStoreDocument,
            Hook::AfterStoreDocument,
        ])
    }

    async fn on_load_document(&self, load: &mut LoadContext) -> HookResult<()> {
        match self.client.fetch(&load.room).await {
            FetchResponse::Content { content_base64 } => {
                let state = decode_content(&content_base64)?;
                debug!(room = %load.room, bytes = state.len(), "document loaded");
                load.state = Some(state);
                Ok(())
            }
            FetchResponse::Error { error, code } => Err(HookError::Storage(format!(
                "fetching '{}' failed ({code:?}): {error}",
                load.room
            ))),
        }
    }

    async fn on_store_document(&self, store: &mut StoreContext) -> HookResult<()> {
        let content = encode_content(&store.state);
        let response = self.client.save(&store.room, &content).await;
        store.saved = response.is_saved();
        store.error = response.error;
        Ok(())
    }

    async fn after_store_document(
        &self,
        store: &StoreContext,
        connections: &[ConnectionInfo],
    ) -> HookResult<()> {
        let message = match &store.error {
            None if store.saved => StatelessMessage::Saved,
            None => return Ok(()),
            Some(error) => StatelessMessage::SaveError {
                error: error.clone(),
            },
        };
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(err) => {
                error!(room = %store.room, error = %err, "failed to encode save result");
                return Ok(());
            }
        };

        for connection in connections {
            if let Err(err) = connection.sink.send_stateless(&payload) {
                error!(
                    room = %store.room,
                    connection = %connection.id,
                    error = %err,
                    "failed to send save result"
                );
            }
        }
        Ok(())
    }
}

/// Keeps documents in memory, for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    documents: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    /// Extension name.
    pub const NAME: &'static str = "memory-storage";

    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored state of a room.
    pub fn document(&self, room: &str) -> Option<Vec<u8>> {
        self.documents.read().get(room).cloned()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

#[async_trait]
impl Extension for InMemoryStorage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::OnLoadDocument, Hook::OnStoreDocument])
    }

    async fn on_load_document(&self, load: &mut LoadContext) -> HookResult<()> {
        if load.state.is_none() {
            load.state = self.document(&load.room);
        }
        Ok(())
    }

    async fn on_store_document(&self, store: &mut StoreContext) -> HookResult<()> {
        self.documents
            .write()
            .insert(store.room.clone(), store.state.clone());
        store.saved = true;
        store.error = None;
        Ok(())
    }
}
