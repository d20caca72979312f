//! Integration tests for the analysis proxy
//!
//! Drives the router with `oneshot`; the hosted model is replaced by fakes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use soulscan::core::{create_router, Provider, ProxyConfig, Upstream, VisionModel};
use soulscan::types::{AnalysisResult, EncodedImage, UpstreamError};
use soulscan::{ANALYZE_PATH, FALLBACK_DANGER_LEVEL};

/// Answers with a fixed verdict and remembers what it saw
struct FakeModel {
    calls: AtomicUsize,
    seen: std::sync::Mutex<Vec<EncodedImage>>,
}

impl FakeModel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            seen: std::sync::Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl VisionModel for FakeModel {
    fn name(&self) -> &str {
        "fake"
    }

    async fn analyze(&self, image: &EncodedImage) -> Result<AnalysisResult, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(image.clone());
        Ok(AnalysisResult::new("发际线逃兵", "额头的面积足够停一架直升机。", 88)
            .with_extra("score", 12)
            .with_extra("luckyItem", "生发水")
            .with_extra("animalMatch", "秃鹫"))
    }
}

struct BrokenModel;

#[async_trait]
impl VisionModel for BrokenModel {
    fn name(&self) -> &str {
        "broken"
    }

    async fn analyze(&self, _: &EncodedImage) -> Result<AnalysisResult, UpstreamError> {
        Err(UpstreamError::Status {
            status: 503,
            body: "overloaded".to_string(),
        })
    }
}

fn ready_router(model: Arc<FakeModel>) -> Router {
    create_router(Upstream::Ready(model))
}

fn analyze_request(body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(ANALYZE_PATH)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

// "jpeg-ish" bytes, base64
const PAYLOAD: &str = "/9j/4AAQSkZJRgABAQ==";

#[tokio::test]
async fn test_health_endpoint() {
    let app = ready_router(FakeModel::new());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["upstream"], "ready");
    assert_eq!(json["provider"], "fake");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_health_reports_misconfigured() {
    let app = create_router(Upstream::from_config(&ProxyConfig::new(Provider::Dashscope, None)));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["upstream"], "misconfigured");
    assert!(json.get("provider").is_none());
}

#[tokio::test]
async fn test_analyze_success() {
    let model = FakeModel::new();
    let app = ready_router(model.clone());

    let response = app.oneshot(analyze_request(json!({ "image": PAYLOAD }))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["title"], "发际线逃兵");
    assert_eq!(json["dangerLevel"], 88);
    assert_eq!(json["score"], 12);
    assert_eq!(json["luckyItem"], "生发水");
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_analyze_sets_cors_origin() {
    let app = ready_router(FakeModel::new());

    let mut request = analyze_request(json!({ "image": PAYLOAD }));
    request
        .headers_mut()
        .insert(header::ORIGIN, "http://localhost:5173".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_data_uri_and_bare_payload_are_equivalent() {
    let model = FakeModel::new();

    let bare = ready_router(model.clone())
        .oneshot(analyze_request(json!({ "image": PAYLOAD })))
        .await
        .unwrap();
    let uri = ready_router(model.clone())
        .oneshot(analyze_request(json!({ "image": format!("data:image/jpeg;base64,{}", PAYLOAD) })))
        .await
        .unwrap();

    assert_eq!(bare.status(), StatusCode::OK);
    assert_eq!(uri.status(), StatusCode::OK);
    assert_eq!(json_body(bare).await, json_body(uri).await);

    let seen = model.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], seen[1]);
    assert_eq!(seen[0].payload(), PAYLOAD);
}

#[tokio::test]
async fn test_preflight_returns_200() {
    let app = ready_router(FakeModel::new());

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri(ANALYZE_PATH)
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    let methods = headers
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(methods.contains("POST"));
    assert!(methods.contains("OPTIONS"));
}

#[tokio::test]
async fn test_bare_options_returns_200() {
    let model = FakeModel::new();
    let app = ready_router(model.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri(ANALYZE_PATH)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_get_is_method_not_allowed() {
    let model = FakeModel::new();
    let app = ready_router(model.clone());

    let response = app
        .oneshot(Request::builder().uri(ANALYZE_PATH).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let json = json_body(response).await;
    assert_eq!(json["error"], "Method Not Allowed");
    assert_eq!(json["error_code"], "METHOD_NOT_ALLOWED");
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_image_is_bad_request() {
    let model = FakeModel::new();

    for body in [json!({}), json!({ "image": "" }), json!({ "image": "   " }), json!({ "image": null })] {
        let response = ready_router(model.clone())
            .oneshot(analyze_request(body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"], "No image provided");
        assert_eq!(json["error_code"], "BAD_REQUEST");
    }
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_base64_is_bad_request() {
    let model = FakeModel::new();
    let app = ready_router(model.clone());

    let response = app
        .oneshot(analyze_request(json!({ "image": "not base64 at all!!" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error_code"], "BAD_REQUEST");
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_non_image_data_uri_is_bad_request() {
    let app = ready_router(FakeModel::new());

    let response = app
        .oneshot(analyze_request(json!({ "image": "data:text/plain;base64,aGVsbG8=" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = ready_router(FakeModel::new());

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(ANALYZE_PATH)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"image\": "))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error_code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_missing_credentials_is_config_error() {
    let config = ProxyConfig::new(Provider::Gemini, Some("   ".to_string()));
    let app = create_router(Upstream::from_config(&config));

    let response = app.oneshot(analyze_request(json!({ "image": PAYLOAD }))).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["error_code"], "CONFIG_ERROR");
    assert!(json["error"].as_str().unwrap().starts_with("Server configuration error"));
    assert_eq!(json["title"], "审判庭未授权");
    assert_eq!(json["dangerLevel"], FALLBACK_DANGER_LEVEL);
}

#[tokio::test]
async fn test_bad_request_checked_before_credentials() {
    let app = create_router(Upstream::Misconfigured("API Key missing".to_string()));

    let response = app.oneshot(analyze_request(json!({}))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upstream_failure_carries_fallback() {
    let app = create_router(Upstream::ready(BrokenModel));

    let response = app.oneshot(analyze_request(json!({ "image": PAYLOAD }))).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["error"], "Analysis failed");
    assert_eq!(json["error_code"], "UPSTREAM_ERROR");
    assert!(json["details"].as_str().unwrap().contains("503"));
    assert_eq!(json["title"], "系统崩溃");
    assert_eq!(json["dangerLevel"], FALLBACK_DANGER_LEVEL);
    assert_eq!(json["score"], 0);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = ready_router(FakeModel::new());

    let response = app
        .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
