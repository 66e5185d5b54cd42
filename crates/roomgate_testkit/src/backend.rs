//! In-memory backend for tests.
//!
//! `FakeBackend` answers the request patterns the way the integration
//! service does: `WHO` by credential, `INFO` by (user, document), `FETCH`
//! and `SAVE` against a document map, and `HEALTH_CHECK` with a healthy
//! flag. Failures and latency can be injected per test.

use async_trait::async_trait;
use parking_lot::Mutex;
use roomgate_protocol::{
    ContributionsEvent, DocumentPermissions, FetchRequest, FetchResponse, HealthCheckResponse,
    InfoRequest, MessagePattern, RpcEvent, RpcRequest, SaveRequest, SaveResponse, UserIdentity,
    WhoRequest,
};
use roomgate_rpc::{BrokerTransport, RpcError, RpcResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// An in-memory stand-in for the backend integration service.
#[derive(Debug)]
pub struct FakeBackend {
    connected: AtomicBool,
    healthy: AtomicBool,
    users: Mutex<HashMap<String, UserIdentity>>,
    permissions: Mutex<HashMap<(String, String), DocumentPermissions>>,
    documents: Mutex<HashMap<String, String>>,
    contributions: Mutex<Vec<ContributionsEvent>>,
    requests: Mutex<Vec<MessagePattern>>,
    failures: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl FakeBackend {
    /// Creates an empty, connected and healthy backend.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            healthy: AtomicBool::new(true),
            users: Mutex::new(HashMap::new()),
            permissions: Mutex::new(HashMap::new()),
            documents: Mutex::new(HashMap::new()),
            contributions: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(0),
            delay: Mutex::new(None),
        }
    }

    /// Registers a user behind a credential (a raw cookie or an
    /// `Authorization` header value such as `Bearer t1`).
    pub fn add_user(&self, credential: impl Into<String>, identity: UserIdentity) {
        self.users.lock().insert(credential.into(), identity);
    }

    /// Sets the permissions of a user on a document.
    pub fn set_permissions(&self, user_id: &str, document_id: &str, permissions: DocumentPermissions) {
        self.permissions
            .lock()
            .insert((user_id.to_string(), document_id.to_string()), permissions);
    }

    /// Stores a document directly.
    pub fn put_document(&self, document_id: &str, content_base64: impl Into<String>) {
        self.documents
            .lock()
            .insert(document_id.to_string(), content_base64.into());
    }

    /// Returns the stored content of a document.
    pub fn document(&self, document_id: &str) -> Option<String> {
        self.documents.lock().get(document_id).cloned()
    }

    /// Makes the next `count` requests fail with a backend error.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Delays every answer by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Sets the answer of health checks.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Returns every contribution report received.
    pub fn contributions(&self) -> Vec<ContributionsEvent> {
        self.contributions.lock().clone()
    }

    /// Returns the patterns of every request received.
    pub fn requests(&self) -> Vec<MessagePattern> {
        self.requests.lock().clone()
    }

    /// Returns how many requests with `pattern` were received.
    pub fn request_count(&self, pattern: MessagePattern) -> usize {
        self.requests.lock().iter().filter(|p| **p == pattern).count()
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn answer(&self, request: &RpcRequest) -> RpcResult<serde_json::Value> {
        let value = match request.pattern {
            MessagePattern::Who => {
                let who: WhoRequest = request.decode_payload()?;
                let users = self.users.lock();
                let identity = who
                    .authorization
                    .as_ref()
                    .and_then(|a| users.get(a))
                    .or_else(|| who.cookie.as_ref().and_then(|c| users.get(c)));
                to_value(&identity)?
            }
            MessagePattern::Info => {
                let info: InfoRequest = request.decode_payload()?;
                let permissions = self
                    .permissions
                    .lock()
                    .get(&(info.user_id, info.document_id))
                    .copied()
                    .unwrap_or_else(DocumentPermissions::deny_all);
                to_value(&permissions)?
            }
            MessagePattern::Fetch => {
                let fetch: FetchRequest = request.decode_payload()?;
                let response = match self.document(&fetch.document_id) {
                    Some(content) => FetchResponse::content(content),
                    None => FetchResponse::not_found(&fetch.document_id),
                };
                to_value(&response)?
            }
            MessagePattern::Save => {
                let save: SaveRequest = request.decode_payload()?;
                self.put_document(&save.document_id, save.content_base64);
                to_value(&SaveResponse::saved())?
            }
            MessagePattern::HealthCheck => to_value(&HealthCheckResponse {
                healthy: self.healthy.load(Ordering::SeqCst),
            })?,
        };
        Ok(value)
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> RpcResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| RpcError::Codec(e.to_string()))
}

#[async_trait]
impl BrokerTransport for FakeBackend {
    async fn request(&self, request: RpcRequest) -> RpcResult<serde_json::Value> {
        if !self.is_connected() {
            return Err(RpcError::NotConnected);
        }
        self.requests.lock().push(request.pattern);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.take_failure() {
            return Err(RpcError::Remote("injected failure".into()));
        }
        self.answer(&request)
    }

    async fn emit(&self, event: RpcEvent) -> RpcResult<()> {
        if !self.is_connected() {
            return Err(RpcError::NotConnected);
        }
        let report: ContributionsEvent = event.decode_payload()?;
        self.contributions.lock().push(report);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> RpcResult<()> {
        self.set_connected(false);
        Ok(())
    }
}
