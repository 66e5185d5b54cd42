//! Timeout and retry loop around a [`BrokerTransport`].

use crate::config::RequestConfig;
use crate::error::{RpcError, RpcResult};
use crate::transport::BrokerTransport;
use parking_lot::RwLock;
use roomgate_protocol::{MessagePattern, RpcEvent, RpcRequest};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{trace, warn};

/// Counters of the sender.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// Requests started.
    pub requests: u64,
    /// Attempts made, including the first one of each request.
    pub attempts: u64,
    /// Retries scheduled.
    pub retries: u64,
    /// Requests that failed after all attempts.
    pub failures: u64,
}

/// Sends requests with a per-attempt timeout and exponential backoff.
///
/// A request is attempted at most `max_retries + 1` times. Only
/// [`RpcError::is_retryable`] errors are retried; connection and codec
/// errors are returned from the attempt that produced them.
pub struct RpcSender {
    transport: Arc<dyn BrokerTransport>,
    stats: RwLock<SenderStats>,
}

impl RpcSender {
    /// Creates a sender over the given transport.
    pub fn new(transport: Arc<dyn BrokerTransport>) -> Self {
        Self {
            transport,
            stats: RwLock::new(SenderStats::default()),
        }
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &Arc<dyn BrokerTransport> {
        &self.transport
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> SenderStats {
        self.stats.read().clone()
    }

    /// Sends a request and decodes its response.
    pub async fn send<Req, Resp>(
        &self,
        pattern: MessagePattern,
        payload: &Req,
        config: &RequestConfig,
    ) -> RpcResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let request = RpcRequest::new(pattern, payload)?;
        let started = Instant::now();
        self.stats.write().requests += 1;

        let mut retry = 0;
        loop {
            let err = match self.attempt(request.clone(), config.timeout).await {
                Ok(value) => {
                    trace!(
                        %pattern,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        retries = retry,
                        "request completed"
                    );
                    return serde_json::from_value(value)
                        .map_err(|e| RpcError::Codec(format!("{pattern} response: {e}")));
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                self.stats.write().failures += 1;
                return Err(err);
            }

            if retry >= config.max_retries {
                self.stats.write().failures += 1;
                if config.max_retries == 0 {
                    return Err(err);
                }
                return Err(RpcError::RetryExhausted {
                    pattern,
                    retries: config.max_retries,
                    source: Box::new(err),
                });
            }

            retry += 1;
            let delay = config.delay_for_retry(retry);
            self.stats.write().retries += 1;
            warn!(
                %pattern,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Retrying {} request [{}/{}]",
                pattern,
                retry,
                config.max_retries
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Publishes an event once, bounded by the configured timeout.
    pub async fn emit(&self, event: RpcEvent, config: &RequestConfig) -> RpcResult<()> {
        let pattern = event.pattern;
        match tokio::time::timeout(config.timeout, self.transport.emit(event)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::EmitTimeout {
                event: pattern,
                elapsed_ms: config.timeout.as_millis() as u64,
            }),
        }
    }

    async fn attempt(
        &self,
        request: RpcRequest,
        timeout: Duration,
    ) -> RpcResult<serde_json::Value> {
        let pattern = request.pattern;
        let started = Instant::now();
        self.stats.write().attempts += 1;

        match tokio::time::timeout(timeout, self.transport.request(request)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout {
                pattern,
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }
}

impl std::fmt::Debug for RpcSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcSender")
            .field("connected", &self.transport.is_connected())
            .field("stats", &*self.stats.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockOutcome, MockTransport};
    use roomgate_protocol::{EventPattern, FetchRequest, HealthCheckResponse};
    use serde_json::json;

    fn sender_with(mock: &Arc<MockTransport>) -> RpcSender {
        RpcSender::new(mock.clone() as Arc<dyn BrokerTransport>)
    }

    fn fetch(doc: &str) -> FetchRequest {
        FetchRequest {
            document_id: doc.into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_succeeds() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_with(MessagePattern::HealthCheck, json!({"healthy": true}));
        let sender = sender_with(&mock);

        let response: HealthCheckResponse = sender
            .send(MessagePattern::HealthCheck, "healthy?", &RequestConfig::default())
            .await
            .unwrap();

        assert!(response.healthy);
        assert_eq!(mock.requests()[0].payload, json!("healthy?"));
        assert_eq!(sender.stats().attempts, 1);
        assert_eq!(sender.stats().retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let mock = Arc::new(MockTransport::new());
        mock.fail_times(2, RpcError::Remote("busy".into()));
        mock.respond_with(MessagePattern::Fetch, json!({"contentBase64": "AA=="}));
        let sender = sender_with(&mock);

        let started = Instant::now();
        let response: serde_json::Value = sender
            .send(MessagePattern::Fetch, &fetch("doc"), &RequestConfig::default())
            .await
            .unwrap();

        assert_eq!(response["contentBase64"], "AA==");
        assert_eq!(mock.request_count(), 3);
        // 20ms + 40ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert_eq!(sender.stats().retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_exhaust_retries() {
        let mock = Arc::new(MockTransport::new());
        for _ in 0..3 {
            mock.push_outcome(MockOutcome::Hang);
        }
        let sender = sender_with(&mock);
        let config = RequestConfig::new(Duration::from_millis(100), 2);

        let started = Instant::now();
        let err = sender
            .send::<_, serde_json::Value>(MessagePattern::Info, &json!({}), &config)
            .await
            .unwrap_err();

        assert_eq!(mock.request_count(), 3);
        // three 100ms timeouts, then 20ms + 40ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(360));
        match &err {
            RpcError::RetryExhausted {
                pattern, retries, ..
            } => {
                assert_eq!(*pattern, MessagePattern::Info);
                assert_eq!(*retries, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(err.root_cause(), RpcError::Timeout { .. }));
        assert_eq!(sender.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_returns_raw_error() {
        let mock = Arc::new(MockTransport::new());
        mock.push_outcome(MockOutcome::Hang);
        let sender = sender_with(&mock);

        let err = sender
            .send::<_, serde_json::Value>(
                MessagePattern::Save,
                &json!({}),
                &RequestConfig::no_retry(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RpcError::Timeout {
                pattern: MessagePattern::Save,
                elapsed_ms
            } if elapsed_ms >= 100
        ));
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_emit_times_out() {
        let mock = Arc::new(MockTransport::new());
        mock.set_emit_stalled(true);
        let sender = sender_with(&mock);
        let event = RpcEvent::new(EventPattern::Contributions, &json!({})).unwrap();

        let err = sender
            .emit(event, &RequestConfig::new(Duration::from_millis(50), 3))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RpcError::EmitTimeout {
                event: EventPattern::Contributions,
                elapsed_ms: 50
            }
        ));
        assert!(!err.is_retryable());
        assert!(mock.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn connection_errors_are_not_retried() {
        let mock = Arc::new(MockTransport::new());
        mock.fail_times(1, RpcError::Connection("refused".into()));
        let sender = sender_with(&mock);

        let err = sender
            .send::<_, serde_json::Value>(MessagePattern::Who, &json!({}), &RequestConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::Connection(_)));
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_response_is_codec_error() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_with(MessagePattern::HealthCheck, json!("nope"));
        let sender = sender_with(&mock);

        let err = sender
            .send::<_, HealthCheckResponse>(
                MessagePattern::HealthCheck,
                "healthy?",
                &RequestConfig::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::Codec(_)));
        assert_eq!(mock.request_count(), 1);
    }
}
