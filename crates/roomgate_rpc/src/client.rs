//! Typed backend calls with fallback values.
//!
//! Each call goes through [`RpcSender`] with the client's [`RequestConfig`].
//! The plain methods never fail: after retries are exhausted they log the
//! error and return a conservative fallback (no identity, deny-all
//! permissions, an internal-error fetch, a failed save). The `try_*`
//! variants return the error instead, for callers that must distinguish a
//! backend failure from a negative answer.

use crate::config::RequestConfig;
use crate::error::RpcResult;
use crate::sender::{RpcSender, SenderStats};
use crate::transport::BrokerTransport;
use roomgate_protocol::{
    ContributionsEvent, DocumentPermissions, EventPattern, FetchRequest, FetchResponse,
    HealthCheckResponse, InfoRequest, MessagePattern, RpcEvent, SaveRequest, SaveResponse,
    UserIdentity, WhoRequest, HEALTH_CHECK_PAYLOAD,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Client of the backend integration service.
#[derive(Debug)]
pub struct IntegrationClient {
    sender: RpcSender,
    config: RequestConfig,
}

impl IntegrationClient {
    /// Creates a client over the given transport.
    pub fn new(transport: Arc<dyn BrokerTransport>, config: RequestConfig) -> Self {
        Self {
            sender: RpcSender::new(transport),
            config,
        }
    }

    /// Returns the request configuration.
    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Returns the sender counters.
    pub fn stats(&self) -> SenderStats {
        self.sender.stats()
    }

    /// Resolves the user behind the given credentials.
    pub async fn try_who(&self, request: &WhoRequest) -> RpcResult<Option<UserIdentity>> {
        self.sender
            .send(MessagePattern::Who, request, &self.config)
            .await
    }

    /// Resolves the user behind the given credentials, `None` on failure.
    pub async fn who(&self, request: &WhoRequest) -> Option<UserIdentity> {
        match self.try_who(request).await {
            Ok(identity) => identity,
            Err(err) => {
                error!(error = %err, "WHO request failed");
                None
            }
        }
    }

    /// Fetches the permissions of a user on a document.
    pub async fn try_info(&self, user_id: &str, document_id: &str) -> RpcResult<DocumentPermissions> {
        let request = InfoRequest {
            user_id: user_id.to_string(),
            document_id: document_id.to_string(),
        };
        self.sender
            .send(MessagePattern::Info, &request, &self.config)
            .await
    }

    /// Fetches the permissions of a user on a document, deny-all on failure.
    pub async fn info(&self, user_id: &str, document_id: &str) -> DocumentPermissions {
        match self.try_info(user_id, document_id).await {
            Ok(permissions) => permissions,
            Err(err) => {
                error!(user = user_id, room = document_id, error = %err, "INFO request failed");
                DocumentPermissions::deny_all()
            }
        }
    }

    /// Fetches the stored content of a document.
    pub async fn fetch(&self, document_id: &str) -> FetchResponse {
        let request = FetchRequest {
            document_id: document_id.to_string(),
        };
        match self
            .sender
            .send(MessagePattern::Fetch, &request, &self.config)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                error!(room = document_id, error = %err, "FETCH request failed");
                FetchResponse::internal_error(err.to_string())
            }
        }
    }

    /// Stores the content of a document.
    pub async fn save(&self, document_id: &str, content_base64: &str) -> SaveResponse {
        let request = SaveRequest {
            document_id: document_id.to_string(),
            content_base64: content_base64.to_string(),
        };
        match self
            .sender
            .send(MessagePattern::Save, &request, &self.config)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                error!(room = document_id, error = %err, "SAVE request failed");
                SaveResponse::failed(err.to_string())
            }
        }
    }

    /// Checks the backend over the broker.
    ///
    /// Returns false without a round trip when the transport is down.
    pub async fn is_connected(&self) -> bool {
        if !self.sender.transport().is_connected() {
            return false;
        }
        match self
            .sender
            .send::<_, HealthCheckResponse>(
                MessagePattern::HealthCheck,
                HEALTH_CHECK_PAYLOAD,
                &self.config,
            )
            .await
        {
            Ok(response) => response.healthy,
            Err(err) => {
                debug!(error = %err, "health check failed");
                false
            }
        }
    }

    /// Reports the users who contributed to a document.
    pub async fn report_contributions(
        &self,
        document_id: &str,
        users: Vec<UserIdentity>,
    ) -> RpcResult<()> {
        let event = RpcEvent::new(
            EventPattern::Contributions,
            &ContributionsEvent {
                document_id: document_id.to_string(),
                users,
            },
        )?;
        self.sender.emit(event, &self.config).await
    }

    /// Closes the broker link.
    pub async fn close(&self) -> RpcResult<()> {
        self.sender.transport().close().await
    }
}
