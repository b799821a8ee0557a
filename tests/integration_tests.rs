use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use linkgate::handlers::AppState;
use linkgate::key_generator::{KeyGenerator, KeyStrategy};
use linkgate::rate_limit_config::{RateLimitRule, WindowMode};
use linkgate::store::{BoundedIncrement, CounterSnapshot, CounterStore, MemoryStore};
use linkgate::{create_app, GateError, GateResult};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const WINDOW: Duration = Duration::from_secs(60);

fn app(store: Arc<dyn CounterStore>, limit: u64, strategy: KeyStrategy) -> Router {
    let state = AppState::new(
        store,
        RateLimitRule::new(limit, WINDOW),
        KeyGenerator::new(strategy),
    )
    .unwrap();
    create_app(state).layer(axum::middleware::map_request(from_peer))
}

async fn from_peer(mut request: Request<Body>) -> Request<Body> {
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([1, 2, 3, 4], 50_000))));
    request
}

fn memory_app(limit: u64) -> Router {
    app(Arc::new(MemoryStore::new()), limit, KeyStrategy::PeerAddress)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

struct UnreachableStore;

#[async_trait]
impl CounterStore for UnreachableStore {
    async fn read(&self, _key: &str) -> GateResult<CounterSnapshot> {
        Err(GateError::Store("Connection refused (os error 111)".into()))
    }

    async fn increment(&self, _: &str, _: Duration, _: WindowMode) -> GateResult<u64> {
        Err(GateError::Store("Connection refused (os error 111)".into()))
    }

    async fn increment_within(
        &self,
        _: &str,
        _: u64,
        _: Duration,
        _: WindowMode,
    ) -> GateResult<BoundedIncrement> {
        Err(GateError::Store("Connection refused (os error 111)".into()))
    }

    async fn ping(&self) -> GateResult<()> {
        Err(GateError::Store("Connection refused (os error 111)".into()))
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = memory_app(50).oneshot(get("/api/v1/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "50");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "49");
    assert!(response.headers().contains_key("x-request-id"));

    let body = body_json(response).await;
    assert_eq!(body["statusCode"], 200);
    assert_eq!(body["message"], "OK");
    assert_eq!(body["data"], "Server is healthy");
}

#[tokio::test]
async fn test_rate_limit_exceeded() {
    let app = memory_app(50);

    for i in 0..50 {
        let response = app.clone().oneshot(get("/api/v1/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "request {}", i + 1);
    }

    let response = app.clone().oneshot(get("/api/v1/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    assert_eq!(response.headers()["retry-after"], "60");

    let body = body_json(response).await;
    assert_eq!(body["statusCode"], 429);
    assert_eq!(body["message"], "Rate limit exceeded, try again later");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_store_outage_fails_closed() {
    let app = app(Arc::new(UnreachableStore), 50, KeyStrategy::PeerAddress);

    let response = app.clone().oneshot(get("/api/v1/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!response.headers().contains_key("x-ratelimit-limit"));
    let body = body_json(response).await;
    assert_eq!(body["statusCode"], 500);
    assert_eq!(body["message"], "Internal server error");

    let response = app.oneshot(get("/metrics")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["store_failures"], 1);
    assert_eq!(body["admitted_requests"], 0);
}

#[tokio::test]
async fn test_readiness_reflects_store() {
    let response = memory_app(50).oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let unreachable = app(Arc::new(UnreachableStore), 50, KeyStrategy::PeerAddress);
    let response = unreachable.oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["dependencies"]["counter_store"]["status"], "unavailable");
}

#[tokio::test]
async fn test_probes_are_not_rate_limited() {
    let app = memory_app(1);
    app.clone().oneshot(get("/api/v1/health")).await.unwrap();

    for _ in 0..5 {
        let response = app.clone().oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.clone().oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.oneshot(get("/metrics")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["admitted_requests"], 1);
    assert_eq!(body["throttled_requests"], 0);
}

#[tokio::test]
async fn test_forwarded_identities_are_isolated() {
    let app = app(Arc::new(MemoryStore::new()), 2, KeyStrategy::ForwardedFor);
    let from = |ip: &'static str| {
        Request::builder()
            .uri("/api/v1/health")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..2 {
        let response = app.clone().oneshot(from("198.51.100.7")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.clone().oneshot(from("198.51.100.7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = app.oneshot(from("198.51.100.8")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_made_up_api_keys_share_the_peer_limit() {
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        RateLimitRule::new(2, WINDOW),
        KeyGenerator::new(KeyStrategy::ApiKey).with_api_keys(["tenant-42"]),
    )
    .unwrap();
    let app = create_app(state).layer(axum::middleware::map_request(from_peer));
    let with_key = |key: String| {
        Request::builder()
            .uri("/api/v1/health")
            .header("x-api-key", key)
            .body(Body::empty())
            .unwrap()
    };

    let mut admitted = 0;
    for i in 0..100 {
        let response = app
            .clone()
            .oneshot(with_key(format!("made-up-{}", i)))
            .await
            .unwrap();
        if response.status() == StatusCode::OK {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 2);

    let response = app
        .oneshot(with_key("tenant-42".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_quota_status_reports_caller_usage() {
    let store = MemoryStore::new();
    let app = app(Arc::new(store.clone()), 5, KeyStrategy::PeerAddress);
    app.clone().oneshot(get("/api/v1/health")).await.unwrap();

    let response = app.oneshot(get("/api/v1/rate-limit")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let data = &body["data"];
    assert_eq!(data["identity"], "1.2.3.4");
    assert_eq!(data["limit"], 5);
    assert_eq!(data["used"], 2);
    assert_eq!(data["remaining"], 3);
    assert_eq!(data["rule"]["window"], "1m");
    assert_eq!(data["rule"]["window_mode"], "sliding");

    let snapshot = tokio_test::assert_ok!(store.read("rate_limit:1.2.3.4").await);
    assert_eq!(snapshot.count, 2);
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let request = Request::builder()
        .uri("/metrics")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = memory_app(50).oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn test_peer_address_identity_over_tcp() {
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        RateLimitRule::new(3, WINDOW),
        KeyGenerator::new(KeyStrategy::PeerAddress),
    )
    .unwrap();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let response = client
        .get(format!("{}/api/v1/health", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: Value = client
        .get(format!("{}/api/v1/rate-limit", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["identity"], "127.0.0.1");
    assert_eq!(body["data"]["used"], 2);

    client
        .get(format!("{}/api/v1/health", base))
        .send()
        .await
        .unwrap();
    let response = client
        .get(format!("{}/api/v1/health", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::TOO_MANY_REQUESTS);
}
