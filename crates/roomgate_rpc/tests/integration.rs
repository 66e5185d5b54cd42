//! Integration tests for the integration client against an in-memory backend.

use roomgate_protocol::{
    decode_content, encode_content, DocumentPermissions, FetchErrorCode, FetchResponse,
    MessagePattern, UserIdentity, WhoRequest,
};
use roomgate_rpc::{BrokerTransport, IntegrationClient, RequestConfig};
use roomgate_testkit::FakeBackend;
use std::sync::Arc;
use std::time::Duration;

fn client(backend: &Arc<FakeBackend>) -> IntegrationClient {
    IntegrationClient::new(
        backend.clone() as Arc<dyn BrokerTransport>,
        RequestConfig::new(Duration::from_millis(500), 3),
    )
}

#[tokio::test(start_paused = true)]
async fn save_then_fetch_is_byte_identical() {
    let backend = Arc::new(FakeBackend::new());
    let client = client(&backend);
    let state: Vec<u8> = (0..=255).collect();

    let saved = client.save("doc-1", &encode_content(&state)).await;
    assert!(saved.is_saved());

    match client.fetch("doc-1").await {
        FetchResponse::Content { content_base64 } => {
            assert_eq!(decode_content(&content_base64).unwrap(), state);
        }
        other => panic!("unexpected fetch response: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn fetch_unknown_document() {
    let backend = Arc::new(FakeBackend::new());
    let client = client(&backend);

    assert!(matches!(
        client.fetch("missing").await,
        FetchResponse::Error {
            code: FetchErrorCode::NotFound,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn who_and_info() {
    let backend = Arc::new(FakeBackend::new());
    let alice = UserIdentity::new("u1", "alice@example.com");
    backend.add_user("Bearer t1", alice.clone());
    let permissions = DocumentPermissions {
        can_read: true,
        can_update: true,
        is_multi_user: true,
        max_collaborators: 5,
    };
    backend.set_permissions("u1", "doc-1", permissions);
    let client = client(&backend);

    let identity = client
        .who(&WhoRequest::with_authorization("Bearer t1"))
        .await;
    assert_eq!(identity, Some(alice));
    assert_eq!(client.info("u1", "doc-1").await, permissions);
    assert_eq!(client.info("u1", "doc-2").await, DocumentPermissions::deny_all());
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let backend = Arc::new(FakeBackend::new());
    backend.fail_next(2);
    let client = client(&backend);

    assert!(client.is_connected().await);
    assert_eq!(backend.request_count(MessagePattern::HealthCheck), 3);
    assert_eq!(client.stats().retries, 2);
}

#[tokio::test(start_paused = true)]
async fn slow_backend_times_out() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_delay(Some(Duration::from_secs(2)));
    let client = client(&backend);

    let saved = client.save("doc-1", "AA==").await;
    assert!(!saved.is_saved());
    assert!(saved.error.unwrap().contains("timed out"));
    assert_eq!(backend.request_count(MessagePattern::Save), 4);
}

#[tokio::test(start_paused = true)]
async fn disconnected_backend() {
    let backend = Arc::new(FakeBackend::new());
    let client = client(&backend);

    client.close().await.unwrap();
    assert!(!client.is_connected().await);
    assert!(client.fetch("doc-1").await.is_error());
    assert!(backend.requests().is_empty());
}
