//! Read-only and capacity policy.
//!
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! 1. no read access: forbidden (`NO_UPDATE_ACCESS`, connection dropped)
//! 2. no update access: read-only, `NO_UPDATE_ACCESS`
//! 3. another editor present on a single-user document: read-only,
//!    `MULTI_USER_NOT_ALLOWED`
//! 4. editors at or over capacity: read-only, `ROOM_CAPACITY_REACHED`
//! 5. otherwise the connection may edit
//!
//! The collaborator count is read without locking the room. Two joins can
//! both observe a count below capacity and both be admitted; comparing with
//! `>=` makes the next evaluation see the overshoot.

use crate::connection::ConnectionHandle;
use crate::context::{AuthenticatedBy, AuthorizationResult, ContextAccess, ContextField};
use crate::error::{HookError, HookResult};
use crate::extension::{Extension, Hook, HookSet};
use crate::registry::ConnectionRegistry;
use async_trait::async_trait;
use roomgate_protocol::{DocumentPermissions, ReadOnlyCode, StatelessMessage};
use roomgate_rpc::IntegrationClient;
use std::sync::Arc;
use tracing::debug;

/// Applies the policy to backend permissions and the number of other
/// editors in the room.
pub fn evaluate(permissions: &DocumentPermissions, collaborators: usize) -> AuthorizationResult {
    let read_only_reason = if !permissions.can_read || !permissions.can_update {
        Some(ReadOnlyCode::NoUpdateAccess)
    } else if collaborators > 0 && !permissions.is_multi_user {
        Some(ReadOnlyCode::MultiUserNotAllowed)
    } else if collaborators >= permissions.max_collaborators as usize {
        Some(ReadOnlyCode::RoomCapacityReached)
    } else {
        None
    };

    AuthorizationResult {
        can_read: permissions.can_read,
        can_update: permissions.can_update,
        read_only: read_only_reason.is_some(),
        read_only_reason,
        is_multi_user_allowed: permissions.is_multi_user,
        max_collaborators: permissions.max_collaborators,
    }
}

/// Resolves the read-only state of authenticated connections.
///
/// Runs at whichever of `onConnect` and `onAuthenticate` authenticated the
/// connection, and reports the result to the client in `connected`.
pub struct Authorizer {
    client: Arc<IntegrationClient>,
    registry: Arc<dyn ConnectionRegistry>,
}

impl Authorizer {
    /// Extension name.
    pub const NAME: &'static str = "authorizer";

    /// Creates an authorizer.
    pub fn new(client: Arc<IntegrationClient>, registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { client, registry }
    }

    /// Fetches the permissions of `user_id` on `room` and applies the policy.
    ///
    /// Backend failures yield deny-all permissions, hence `can_read == false`.
    pub async fn authorize(
        &self,
        user_id: &str,
        room: &str,
        collaborators: usize,
    ) -> AuthorizationResult {
        let permissions = self.client.info(user_id, room).await;
        evaluate(&permissions, collaborators)
    }

    async fn authorize_connection(
        &self,
        connection: &mut ConnectionHandle,
        stage: AuthenticatedBy,
    ) -> HookResult<()> {
        if connection.context.auth.authenticated_by() != Some(stage) {
            return Ok(());
        }
        let Some(user_id) = connection.context.identity().map(|i| i.id.clone()) else {
            return Ok(());
        };

        let room = connection.room().to_string();
        let collaborators = self.registry.collaborator_count(&room, connection.id());
        let result = self.authorize(&user_id, &room, collaborators).await;
        if !result.can_read {
            return Err(HookError::Forbidden {
                user: user_id,
                room,
            });
        }

        debug!(
            connection = %connection.id(),
            user = %user_id,
            room = %room,
            collaborators,
            read_only = result.read_only,
            reason = ?result.read_only_reason,
            "authorized"
        );
        connection.read_only = result.read_only;
        connection.context.authorization = Some(result);
        Ok(())
    }
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer").finish_non_exhaustive()
    }
}

#[async_trait]
impl Extension for Authorizer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::OnConnect, Hook::OnAuthenticate, Hook::Connected])
    }

    fn context_access(&self) -> ContextAccess {
        ContextAccess {
            reads: &[ContextField::AuthContext, ContextField::Identity],
            writes: &[ContextField::Authorization],
        }
    }

    async fn on_connect(&self, connection: &mut ConnectionHandle) -> HookResult<()> {
        self.authorize_connection(connection, AuthenticatedBy::ConnectHook)
            .await
    }

    async fn on_authenticate(&self, connection: &mut ConnectionHandle, _token: &str) -> HookResult<()> {
        self.authorize_connection(connection, AuthenticatedBy::AuthenticateHook)
            .await
    }

    async fn connected(&self, connection: &ConnectionHandle) {
        let message =
            StatelessMessage::read_only_state(connection.read_only, connection.context.read_only_code());
        connection.send_stateless(&message);

        let room = connection.room();
        debug!(
            room,
            total = self.registry.connections(room).len(),
            collaborators = self.registry.collaborator_connections(room).len(),
            read_only = self.registry.read_only_connections(room).len(),
            "connection established"
        );
    }
}
