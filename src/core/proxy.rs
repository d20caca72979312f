//! HTTP analysis proxy
//!
//! Endpoints:
//! - POST /api/analyze - Analyze one image (`{"image": "<base64 or data URI>"}`)
//! - OPTIONS /api/analyze - CORS preflight
//! - GET /health - Health check
//!
//! Stateless: every request is one call to the hosted model, no retries.
//! Failures come back as non-2xx JSON carrying `error`, `error_code` and the
//! fields of a fallback report.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{HeaderName, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::core::client::AnalyzeRequest;
use crate::core::upstream::{build_model, ModelConfig, Provider, VisionModel};
use crate::types::{AnalysisFailure, AnalysisResult, EncodedImage, UpstreamError};
use crate::{ANALYZE_PATH, MAX_BODY_BYTES};

/// Proxy settings, read from flags and environment at startup
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub provider: Provider,
    /// Upstream credential; `None` or blank leaves the proxy misconfigured
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl ProxyConfig {
    pub fn new(provider: Provider, api_key: Option<String>) -> Self {
        Self {
            provider,
            api_key,
            model: None,
            base_url: None,
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// The hosted model the proxy forwards to, resolved once at startup
pub enum Upstream {
    Ready(Arc<dyn VisionModel>),
    /// No usable credentials; every analysis answers with `CONFIG_ERROR`
    Misconfigured(String),
}

impl Upstream {
    pub fn from_config(config: &ProxyConfig) -> Self {
        let key = match config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => return Upstream::Misconfigured("API Key missing".to_string()),
        };

        let mut model = ModelConfig::new(config.provider, key);
        if let Some(name) = &config.model {
            model.model = name.clone();
        }
        if let Some(url) = &config.base_url {
            model.base_url = url.clone();
        }
        model.timeout = config.timeout;

        match build_model(model) {
            Ok(model) => Upstream::Ready(Arc::from(model)),
            Err(e) => Upstream::Misconfigured(e.to_string()),
        }
    }

    /// Wrap an already-built model
    pub fn ready(model: impl VisionModel + 'static) -> Self {
        Upstream::Ready(Arc::new(model))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Upstream::Ready(_))
    }
}

/// Proxy state
pub struct ProxyState {
    pub upstream: Upstream,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub upstream: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Errors answered by the proxy
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Server configuration error: {0}")]
    Configuration(String),

    #[error("Analysis failed")]
    Upstream(#[from] UpstreamError),
}

/// Failure body: error fields plus a fallback report
#[derive(Debug, Serialize)]
struct FailureBody {
    error: String,
    error_code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(flatten)]
    fallback: AnalysisResult,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            ProxyError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", None),
            ProxyError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED", None),
            ProxyError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", None),
            ProxyError::Upstream(e) => (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_ERROR", Some(e.to_string())),
        };

        let message = self.to_string();
        let failure = match &self {
            ProxyError::Configuration(_) => AnalysisFailure::Configuration(message.clone()),
            _ => AnalysisFailure::Upstream {
                status: status.as_u16(),
                message: details.clone().unwrap_or_else(|| message.clone()),
            },
        };

        error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            details = ?details,
            "analysis request failed"
        );

        let body = FailureBody {
            error: message,
            error_code,
            details,
            fallback: AnalysisResult::fallback(&failure),
        };

        (status, Json(body)).into_response()
    }
}

/// Fixed CORS policy: any origin, the usual methods and headers
pub fn cors_layer() -> CorsLayer {
    const ALLOWED_HEADERS: [&str; 9] = [
        "x-csrf-token",
        "x-requested-with",
        "accept",
        "accept-version",
        "content-length",
        "content-md5",
        "content-type",
        "date",
        "x-api-version",
    ];

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::OPTIONS,
            Method::PATCH,
            Method::DELETE,
            Method::POST,
            Method::PUT,
        ])
        .allow_headers(ALLOWED_HEADERS.map(HeaderName::from_static))
}

/// Create the proxy router
pub fn create_router(upstream: Upstream) -> Router {
    let state = Arc::new(ProxyState { upstream });

    Router::new()
        .route("/health", get(health))
        .route(
            ANALYZE_PATH,
            post(analyze).options(preflight).fallback(method_not_allowed),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<ProxyState>>) -> Json<HealthResponse> {
    let (upstream, provider) = match &state.upstream {
        Upstream::Ready(model) => ("ready", Some(model.name().to_string())),
        Upstream::Misconfigured(_) => ("misconfigured", None),
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        upstream: upstream.to_string(),
        provider,
    })
}

/// OPTIONS without preflight headers still gets a plain 200
async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> ProxyError {
    ProxyError::MethodNotAllowed
}

/// Analyze one image
async fn analyze(
    State(state): State<Arc<ProxyState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalysisResult>, ProxyError> {
    let Json(req) = payload.map_err(|e| ProxyError::BadRequest(e.body_text()))?;

    let raw = req
        .image
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ProxyError::BadRequest("No image provided".to_string()))?;

    let image = EncodedImage::parse(&raw).map_err(|e| ProxyError::BadRequest(e.to_string()))?;
    image.decode().map_err(|e| ProxyError::BadRequest(e.to_string()))?;

    let model = match &state.upstream {
        Upstream::Ready(model) => model.clone(),
        Upstream::Misconfigured(reason) => {
            warn!(reason = %reason, "analysis requested without usable credentials");
            return Err(ProxyError::Configuration(reason.clone()));
        }
    };

    let result = model.analyze(&image).await?;
    info!(provider = model.name(), title = %result.title, danger = result.danger_level, "analysis served");
    Ok(Json(result))
}

/// Run the proxy
pub async fn run_server(addr: &str, upstream: Upstream) -> Result<(), Box<dyn std::error::Error>> {
    if let Upstream::Misconfigured(reason) = &upstream {
        warn!(reason = %reason, "starting without upstream credentials, analysis will answer CONFIG_ERROR");
    }

    let router = create_router(upstream);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "analysis proxy listening");
    println!("  POST    {}  - Analyze image", ANALYZE_PATH);
    println!("  OPTIONS {}  - CORS preflight", ANALYZE_PATH);
    println!("  GET     /health       - Health check");
    axum::serve(listener, router).await?;
    Ok(())
}
