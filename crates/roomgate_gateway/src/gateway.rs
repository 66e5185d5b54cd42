//! Composition root and in-process host adapter.
//!
//! [`Gateway`] builds the default pipeline
//! (authenticator, authorizer, storage, contributions) over one
//! [`IntegrationClient`], and drives it the way the WebSocket transport
//! does: register the connection, run the connect/authenticate sequence,
//! load the room on its first established connection, and unload it when
//! the last connection leaves.
//!
//! Connections joining a room while its document loads wait for that load.
//! They reach `connected` only once the room is open, and fail with the
//! same error if the load fails.

use crate::authenticator::Authenticator;
use crate::authorizer::Authorizer;
use crate::config::{GatewayConfig, StorageKind};
use crate::connection::{ConnectionHandle, Credentials};
use crate::contributions::ContributionAggregator;
use crate::error::{HookError, HookResult, PipelineError};
use crate::extension::{Extension, StoreContext};
use crate::pipeline::{ConnectOutcome, Pipeline};
use crate::registry::{ConnectionRegistry, InMemoryRegistry};
use crate::storage::{DocumentStorage, InMemoryStorage};
use parking_lot::Mutex;
use roomgate_protocol::StatelessSink;
use roomgate_rpc::{BrokerTransport, IntegrationClient};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// The collaboration gateway.
pub struct Gateway {
    config: GatewayConfig,
    client: Arc<IntegrationClient>,
    registry: Arc<InMemoryRegistry>,
    aggregator: Arc<ContributionAggregator>,
    pipeline: Pipeline,
    rooms: Mutex<HashMap<String, RoomSlot>>,
    documents: Mutex<HashMap<String, Vec<u8>>>,
}

/// Load state of a room, shared by the connections joining it.
#[derive(Debug, Default)]
enum RoomPhase {
    #[default]
    Unloaded,
    Open,
    Failed(HookError),
}

type RoomSlot = Arc<tokio::sync::Mutex<RoomPhase>>;

impl Gateway {
    /// Builds the gateway over a broker transport.
    pub fn new(
        config: GatewayConfig,
        transport: Arc<dyn BrokerTransport>,
    ) -> Result<Self, PipelineError> {
        let client = Arc::new(IntegrationClient::new(transport, config.request_config()));
        let registry = Arc::new(InMemoryRegistry::new());
        let aggregator = Arc::new(ContributionAggregator::new(
            config.contribution_window(),
            client.clone(),
        ));

        let storage: Arc<dyn Extension> = match config.collaboration.storage {
            StorageKind::Backend => Arc::new(DocumentStorage::new(client.clone())),
            StorageKind::Memory => Arc::new(InMemoryStorage::new()),
        };
        let extensions: Vec<Arc<dyn Extension>> = vec![
            Arc::new(Authenticator::new(client.clone())),
            Arc::new(Authorizer::new(client.clone(), registry.clone())),
            storage,
            aggregator.clone(),
        ];
        let pipeline = Pipeline::new(extensions)?;

        info!(
            extensions = ?pipeline.priorities(),
            broker = %config.broker.host,
            production = config.production,
            "gateway ready"
        );
        Ok(Self {
            config,
            client,
            registry,
            aggregator,
            pipeline,
            rooms: Mutex::new(HashMap::new()),
            documents: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Returns the backend client.
    pub fn client(&self) -> &Arc<IntegrationClient> {
        &self.client
    }

    /// Returns the connection registry.
    pub fn registry(&self) -> &Arc<InMemoryRegistry> {
        &self.registry
    }

    /// Returns the contribution aggregator.
    pub fn aggregator(&self) -> &Arc<ContributionAggregator> {
        &self.aggregator
    }

    /// Returns the pipeline.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Returns true if the backend answers health checks.
    pub async fn is_healthy(&self) -> bool {
        self.client.is_connected().await
    }

    /// Current document state of a loaded room.
    pub fn document(&self, room: &str) -> Option<Vec<u8>> {
        self.documents.lock().get(room).cloned()
    }

    /// Handles a socket open.
    ///
    /// On error the connection has been unregistered and the socket must be
    /// closed. An unauthenticated connection is returned pending; pass it to
    /// [`Gateway::authenticate`] when the client sends its credential.
    pub async fn open_connection(
        &self,
        room: &str,
        credentials: Credentials,
        sink: Arc<dyn StatelessSink>,
    ) -> HookResult<ConnectionHandle> {
        let mut connection = ConnectionHandle::new(room, credentials, sink);
        self.registry.insert(connection.info());

        let outcome = match self.pipeline.handle_connect(&mut connection).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.discard(&connection).await;
                return Err(err);
            }
        };
        self.registry.update(connection.info());

        if outcome == ConnectOutcome::Established {
            if let Err(err) = self.establish(&mut connection).await {
                self.discard(&connection).await;
                return Err(err);
            }
        }
        Ok(connection)
    }

    /// Handles an explicit credential message.
    ///
    /// On error the connection has been unregistered and the socket must be
    /// closed.
    pub async fn authenticate(
        &self,
        connection: &mut ConnectionHandle,
        token: &str,
    ) -> HookResult<()> {
        let result = match self.pipeline.handle_authenticate(connection, token).await {
            Ok(()) => {
                self.registry.update(connection.info());
                self.establish(connection).await
            }
            Err(err) => Err(err),
        };
        if result.is_err() {
            self.discard(connection).await;
        }
        result
    }

    /// Applies a document change from a connection.
    ///
    /// Returns false if the connection may not edit.
    pub fn apply_change(&self, connection: &ConnectionHandle, state: Vec<u8>) -> bool {
        if connection.read_only || !connection.is_connected() {
            return false;
        }
        let room = connection.room();
        {
            let mut documents = self.documents.lock();
            let Some(document) = documents.get_mut(room) else {
                return false;
            };
            *document = state;
        }
        self.pipeline.dispatch_change(room, &connection.context);
        true
    }

    /// Stores the document of a room and reports the result to its connections.
    pub async fn store(&self, room: &str) -> HookResult<StoreContext> {
        let state = self
            .document(room)
            .ok_or_else(|| HookError::Storage(format!("room '{room}' is not loaded")))?;
        let connections = self.registry.connections(room);
        self.pipeline
            .store_document(room, state, &connections)
            .await
    }

    /// Handles a socket close.
    pub async fn close_connection(&self, connection: ConnectionHandle) {
        self.discard(&connection).await;
    }

    /// Unloads every room and closes the broker link.
    pub async fn shutdown(&self) {
        let rooms: Vec<String> = self.documents.lock().keys().cloned().collect();
        for room in rooms {
            self.unload_room(&room).await;
        }
        if let Err(err) = self.client.close().await {
            error!(error = %err, "failed to close broker link");
        }
    }

    async fn establish(&self, connection: &mut ConnectionHandle) -> HookResult<()> {
        let room = connection.room().to_string();
        let slot = self.rooms.lock().entry(room.clone()).or_default().clone();
        {
            // joiners of a room queue here while its document loads
            let mut phase = slot.lock().await;
            if let RoomPhase::Failed(err) = &*phase {
                return Err(err.clone());
            }
            if matches!(*phase, RoomPhase::Unloaded) {
                if let Err(err) = self.load_room(&room).await {
                    *phase = RoomPhase::Failed(err.clone());
                    self.release_slot(&room, &slot);
                    return Err(err);
                }
                *phase = RoomPhase::Open;
            }
        }

        self.pipeline.connected(connection).await;
        Ok(())
    }

    async fn load_room(&self, room: &str) -> HookResult<()> {
        let state = self.pipeline.load_document(room).await?;
        self.pipeline.open_room(room).await;
        self.documents
            .lock()
            .insert(room.to_string(), state.unwrap_or_default());
        Ok(())
    }

    async fn discard(&self, connection: &ConnectionHandle) {
        let room = connection.room();
        let emptied = self.registry.remove(room, connection.id());
        if emptied && self.pipeline.is_room_open(room) {
            self.unload_room(room).await;
        }
    }

    async fn unload_room(&self, room: &str) {
        let slot = self.rooms.lock().get(room).cloned();
        let Some(slot) = slot else {
            return;
        };
        let mut phase = slot.lock().await;
        if !matches!(*phase, RoomPhase::Open) {
            return;
        }

        if let Err(err) = self.store(room).await {
            error!(room, error = %err, "failed to store document on unload");
        }
        self.pipeline.close_room(room).await;
        self.documents.lock().remove(room);
        *phase = RoomPhase::Unloaded;

        // a joiner that arrived during the unload reopens the room
        if self.registry.connections(room).is_empty() {
            self.release_slot(room, &slot);
        }
    }

    fn release_slot(&self, room: &str, slot: &RoomSlot) {
        let mut rooms = self.rooms.lock();
        if rooms.get(room).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            rooms.remove(room);
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("pipeline", &self.pipeline)
            .field("connections", &self.registry.len())
            .finish_non_exhaustive()
    }
}
