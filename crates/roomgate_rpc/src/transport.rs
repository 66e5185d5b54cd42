//! Broker transport abstraction.

use crate::error::{RpcError, RpcResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use roomgate_protocol::{MessagePattern, RpcEvent, RpcRequest};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

/// A connection to the message broker.
///
/// Implementations dispatch a single request and wait for its correlated
/// response. They map every broker-specific failure onto [`RpcError`]:
/// `Connection`/`NotConnected` for link failures, `Remote` for error replies.
/// Timeouts and retries are applied by the caller, not by the transport.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Sends a request and waits for the raw JSON response.
    async fn request(&self, request: RpcRequest) -> RpcResult<serde_json::Value>;

    /// Publishes an event. No response is expected.
    async fn emit(&self, event: RpcEvent) -> RpcResult<()>;

    /// Checks if the broker link is up.
    fn is_connected(&self) -> bool;

    /// Closes the broker link.
    async fn close(&self) -> RpcResult<()>;
}

/// A scripted outcome for [`MockTransport`].
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Answer with the given JSON value.
    Respond(serde_json::Value),
    /// Fail with the given error.
    Fail(RpcError),
    /// Never answer.
    Hang,
}

/// A mock transport for testing.
///
/// Scripted outcomes are consumed in order; once the script is empty the
/// per-pattern default response is used.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    emit_stalled: AtomicBool,
    script: Mutex<VecDeque<MockOutcome>>,
    defaults: Mutex<HashMap<MessagePattern, serde_json::Value>>,
    requests: Mutex<Vec<RpcRequest>>,
    events: Mutex<Vec<RpcEvent>>,
}

impl MockTransport {
    /// Creates a new connected mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            emit_stalled: AtomicBool::new(false),
            script: Mutex::new(VecDeque::new()),
            defaults: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Appends an outcome to the script.
    pub fn push_outcome(&self, outcome: MockOutcome) {
        self.script.lock().push_back(outcome);
    }

    /// Scripts `times` consecutive failures.
    pub fn fail_times(&self, times: usize, error: RpcError) {
        let mut script = self.script.lock();
        for _ in 0..times {
            script.push_back(MockOutcome::Fail(error.clone()));
        }
    }

    /// Sets the default response for a pattern.
    pub fn respond_with(&self, pattern: MessagePattern, response: serde_json::Value) {
        self.defaults.lock().insert(pattern, response);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes `emit` never complete.
    pub fn set_emit_stalled(&self, stalled: bool) {
        self.emit_stalled.store(stalled, Ordering::SeqCst);
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<RpcRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns every event received so far.
    pub fn events(&self) -> Vec<RpcEvent> {
        self.events.lock().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerTransport for MockTransport {
    async fn request(&self, request: RpcRequest) -> RpcResult<serde_json::Value> {
        if !self.is_connected() {
            return Err(RpcError::NotConnected);
        }
        let pattern = request.pattern;
        self.requests.lock().push(request);

        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(MockOutcome::Respond(value)) => Ok(value),
            Some(MockOutcome::Fail(err)) => Err(err),
            Some(MockOutcome::Hang) => std::future::pending().await,
            None => self
                .defaults
                .lock()
                .get(&pattern)
                .cloned()
                .ok_or_else(|| RpcError::Remote(format!("no mock response for {pattern}"))),
        }
    }

    async fn emit(&self, event: RpcEvent) -> RpcResult<()> {
        if !self.is_connected() {
            return Err(RpcError::NotConnected);
        }
        if self.emit_stalled.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        self.events.lock().push(event);
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
