//! Identity resolution through the backend `WHO` pattern.

use crate::connection::{ConnectionHandle, Credentials};
use crate::context::{AuthenticatedBy, ContextAccess, ContextField};
use crate::error::{HookError, HookResult};
use crate::extension::{Extension, Hook, HookSet};
use async_trait::async_trait;
use roomgate_protocol::UserIdentity;
use roomgate_rpc::{IntegrationClient, RpcResult};
use std::sync::Arc;
use tracing::{debug, error};

/// Authenticates connections from their credentials.
///
/// At connect time a failed lookup leaves the connection unauthenticated so
/// that an explicit credential message can still succeed. At authenticate
/// time any failure is terminal.
#[derive(Debug)]
pub struct Authenticator {
    client: Arc<IntegrationClient>,
}

impl Authenticator {
    /// Extension name.
    pub const NAME: &'static str = "authenticator";

    /// Creates an authenticator over the given client.
    pub fn new(client: Arc<IntegrationClient>) -> Self {
        Self { client }
    }

    /// Resolves the identity behind the credentials.
    ///
    /// Returns `Ok(None)` when there is nothing to look up or the backend
    /// does not know the credential.
    pub async fn authenticate(&self, credentials: &Credentials) -> RpcResult<Option<UserIdentity>> {
        match credentials.preferred() {
            Some(request) => self.client.try_who(&request).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Extension for Authenticator {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::OnConnect, Hook::OnAuthenticate])
    }

    fn context_access(&self) -> ContextAccess {
        ContextAccess {
            reads: &[],
            writes: &[ContextField::AuthContext, ContextField::Identity],
        }
    }

    async fn on_connect(&self, connection: &mut ConnectionHandle) -> HookResult<()> {
        match self.authenticate(connection.credentials()).await {
            Ok(Some(identity)) => {
                debug!(connection = %connection.id(), user = %identity.id, "authenticated at connect");
                connection
                    .context
                    .auth
                    .mark_authenticated(identity, AuthenticatedBy::ConnectHook);
            }
            Ok(None) => {
                debug!(connection = %connection.id(), "no identity at connect; awaiting credentials");
            }
            Err(err) => {
                error!(
                    connection = %connection.id(),
                    room = connection.room(),
                    error = %err,
                    "identity lookup failed at connect"
                );
            }
        }
        Ok(())
    }

    async fn on_authenticate(&self, connection: &mut ConnectionHandle, token: &str) -> HookResult<()> {
        if connection.context.auth.is_authenticated() {
            return Ok(());
        }

        let failure = |reason: String| HookError::AuthenticationFailure {
            room: connection.room().to_string(),
            reason,
        };
        let identity = match self.authenticate(&Credentials::bearer(token)).await {
            Ok(Some(identity)) => identity,
            Ok(None) => return Err(failure("unknown token".into())),
            Err(err) => return Err(failure(err.to_string())),
        };

        debug!(connection = %connection.id(), user = %identity.id, "authenticated by credential message");
        connection
            .context
            .auth
            .mark_authenticated(identity, AuthenticatedBy::AuthenticateHook);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomgate_rpc::{BrokerTransport, RequestConfig};
    use roomgate_testkit::{FakeBackend, RecordingSink};
    use std::time::Duration;

    fn setup() -> (Arc<FakeBackend>, Authenticator) {
        let backend = Arc::new(FakeBackend::new());
        backend.add_user("Bearer t1", UserIdentity::new("u1", "u1@example.com"));
        backend.add_user("session=2", UserIdentity::new("u2", "u2@example.com"));
        let client = IntegrationClient::new(
            backend.clone() as Arc<dyn BrokerTransport>,
            RequestConfig::new(Duration::from_millis(100), 1),
        );
        (backend, Authenticator::new(Arc::new(client)))
    }

    fn connection(credentials: Credentials) -> ConnectionHandle {
        ConnectionHandle::new("doc", credentials, Arc::new(RecordingSink::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn connect_with_cookie() {
        let (_, authenticator) = setup();
        let mut conn = connection(Credentials::cookie("session=2"));

        authenticator.on_connect(&mut conn).await.unwrap();
        assert_eq!(conn.context.identity().unwrap().id, "u2");
        assert_eq!(
            conn.context.auth.authenticated_by(),
            Some(AuthenticatedBy::ConnectHook)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn bearer_wins_over_cookie() {
        let (_, authenticator) = setup();
        let mut conn = connection(Credentials {
            cookie: Some("session=2".into()),
            authorization: Some("Bearer t1".into()),
        });

        authenticator.on_connect(&mut conn).await.unwrap();
        assert_eq!(conn.context.identity().unwrap().id, "u1");
    }

    #[tokio::test(start_paused = true)]
    async fn connect_failure_is_downgraded() {
        let (backend, authenticator) = setup();
        backend.fail_next(5);
        let mut conn = connection(Credentials::cookie("session=2"));

        authenticator.on_connect(&mut conn).await.unwrap();
        assert!(!conn.context.auth.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn authenticate_with_token() {
        let (_, authenticator) = setup();
        let mut conn = connection(Credentials::none());

        authenticator.on_connect(&mut conn).await.unwrap();
        authenticator.on_authenticate(&mut conn, "t1").await.unwrap();
        assert_eq!(
            conn.context.auth.authenticated_by(),
            Some(AuthenticatedBy::AuthenticateHook)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn authenticate_failures_are_fatal() {
        let (backend, authenticator) = setup();

        let mut conn = connection(Credentials::none());
        let err = authenticator
            .on_authenticate(&mut conn, "unknown")
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::AuthenticationFailure { .. }));

        backend.fail_next(5);
        let err = authenticator
            .on_authenticate(&mut conn, "t1")
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::AuthenticationFailure { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn authenticate_is_skipped_once_authenticated() {
        let (backend, authenticator) = setup();
        let mut conn = connection(Credentials::cookie("session=2"));
        authenticator.on_connect(&mut conn).await.unwrap();
        let lookups = backend.requests().len();

        authenticator.on_authenticate(&mut conn, "t1").await.unwrap();
        assert_eq!(backend.requests().len(), lookups);
        assert_eq!(conn.context.identity().unwrap().id, "u2");
    }
}
