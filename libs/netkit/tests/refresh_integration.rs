#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end credential refresh behaviour under concurrency

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use http::header::AUTHORIZATION;
use netkit::{
    AuthError, BearerAuth, EndpointTokenSource, NetworkClient, NetworkConfig, RequestDescriptor, RequestError,
    TokenSource, TransportResponse, mock::MockTransport,
};
use secrecy::SecretString;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Profile {
    name: String,
}

/// Token source that sleeps before answering so concurrent 401s overlap.
struct SlowSource {
    calls: AtomicUsize,
    result: Result<&'static str, &'static str>,
}

impl SlowSource {
    fn new(result: Result<&'static str, &'static str>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            result,
        }
    }
}

#[async_trait]
impl TokenSource for SlowSource {
    async fn fetch(&self, _client: &NetworkClient) -> Result<SecretString, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.result
            .map(|t| SecretString::from(t.to_owned()))
            .map_err(|e| AuthError::Source(e.to_owned()))
    }
}

/// Accepts only `Bearer fresh`; everything else gets a 401.
fn gated_transport() -> Arc<MockTransport> {
    Arc::new(
        MockTransport::new(|req| {
            let ok = req.headers.get(AUTHORIZATION).is_some_and(|v| v == "Bearer fresh");
            if ok {
                Ok(TransportResponse::new(StatusCode::OK, r#"{"name":"Alice"}"#))
            } else {
                Ok(TransportResponse::new(StatusCode::UNAUTHORIZED, r#"{"error":"expired"}"#))
            }
        })
        .with_latency(Duration::from_millis(5)),
    )
}

fn client(transport: &Arc<MockTransport>, auth: Arc<BearerAuth>) -> NetworkClient {
    let client = NetworkClient::new();
    client
        .configure(
            NetworkConfig::builder(transport.clone())
                .base_path("https://api.example.com")
                .build(),
            Some(auth),
        )
        .unwrap();
    client
}

#[tokio::test]
async fn concurrent_401s_share_one_refresh() {
    let transport = gated_transport();
    let source = Arc::new(SlowSource::new(Ok("fresh")));
    let auth = Arc::new(BearerAuth::new(source.clone()).with_token(SecretString::from("stale".to_owned())));
    let client = client(&transport, auth);

    let descriptor = RequestDescriptor::get("me");
    let (a, b, c) = tokio::join!(
        client.submit::<Profile>(&descriptor),
        client.submit::<Profile>(&descriptor),
        client.submit::<Profile>(&descriptor),
    );

    for result in [a, b, c] {
        assert_eq!(result.unwrap().name, "Alice");
    }
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);

    // three originals plus exactly one retry each
    let sent = transport.requests();
    assert_eq!(sent.len(), 6);
    let retried = sent
        .iter()
        .filter(|r| r.headers.get(AUTHORIZATION).is_some_and(|v| v == "Bearer fresh"))
        .count();
    assert_eq!(retried, 3);
}

#[tokio::test]
async fn concurrent_401s_across_tasks_share_one_refresh() {
    let transport = gated_transport();
    let source = Arc::new(SlowSource::new(Ok("fresh")));
    let auth = Arc::new(BearerAuth::new(source.clone()).with_token(SecretString::from("stale".to_owned())));
    let client = client(&transport, auth);

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.submit::<Profile>(&RequestDescriptor::get("me")).await })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().name, "Alice");
    }
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_refresh_means_no_retries() {
    let transport = gated_transport();
    let source = Arc::new(SlowSource::new(Err("revoked")));
    let auth = Arc::new(BearerAuth::new(source.clone()).with_token(SecretString::from("stale".to_owned())));
    let client = client(&transport, auth);

    let descriptor = RequestDescriptor::get("me");
    let (a, b, c) = tokio::join!(
        client.submit::<Profile>(&descriptor),
        client.submit::<Profile>(&descriptor),
        client.submit::<Profile>(&descriptor),
    );

    for result in [a, b, c] {
        assert!(matches!(result, Err(RequestError::Unauthenticated)));
    }
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert_eq!(transport.request_count(), 3);
}

#[tokio::test]
async fn later_401_starts_a_new_refresh() {
    let transport = gated_transport();
    let source = Arc::new(SlowSource::new(Ok("fresh")));
    let auth = Arc::new(BearerAuth::new(source.clone()).with_token(SecretString::from("stale".to_owned())));
    let client = client(&transport, auth.clone());

    client.submit::<Profile>(&RequestDescriptor::get("me")).await.unwrap();
    auth.set_token(SecretString::from("stale-again".to_owned()));
    client.submit::<Profile>(&RequestDescriptor::get("me")).await.unwrap();

    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn endpoint_source_refreshes_through_the_same_client() {
    let token_requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&token_requests);
    let transport = Arc::new(MockTransport::new(move |req| {
        if req.uri.path() == "/oauth/token" {
            counter.fetch_add(1, Ordering::SeqCst);
            assert!(req.headers.get(AUTHORIZATION).is_none());
            return Ok(TransportResponse::new(StatusCode::OK, r#"{"access_token":"fresh"}"#));
        }
        let ok = req.headers.get(AUTHORIZATION).is_some_and(|v| v == "Bearer fresh");
        let status = if ok { StatusCode::OK } else { StatusCode::UNAUTHORIZED };
        Ok(TransportResponse::new(status, r#"{"name":"Bob"}"#))
    }));

    let source = EndpointTokenSource::new(RequestDescriptor::post("oauth/token"), "access_token");
    let auth = Arc::new(BearerAuth::new(Arc::new(source)));
    let client = client(&transport, auth);

    let profile: Profile = client.submit(&RequestDescriptor::get("me")).await.unwrap();
    assert_eq!(profile.name, "Bob");
    assert_eq!(token_requests.load(Ordering::SeqCst), 1);
}
