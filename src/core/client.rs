//! Analysis client
//!
//! One request in, one report out. Every failure on the way (transport,
//! non-2xx, malformed body, missing credentials) becomes a themed fallback
//! report; callers never see an error. No retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::{AnalysisFailure, AnalysisResult, ConfigError, EncodedImage};
use crate::DEFAULT_TIMEOUT_SECS;

/// Something that turns a captured frame into a report
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Always resolves; failures come back as fallback reports
    async fn analyze(&self, image: &EncodedImage) -> AnalysisResult;
}

/// Where and how to reach the analysis proxy
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Full URL of the analyze endpoint
    pub endpoint: String,
    /// Bound on one round trip
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Request body sent to the proxy
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub image: Option<String>,
}

/// Error fields of a non-2xx proxy body
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// HTTP client for the analysis proxy
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    http: Client,
    endpoint: Url,
}

impl AnalysisClient {
    /// Validate the configuration and build the client
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            reason: e.to_string(),
        })?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: config.endpoint,
                reason: format!("unsupported scheme '{}'", endpoint.scheme()),
            });
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Analyze an image given as a data URI or bare base64
    pub async fn analyze_str(&self, image: &str) -> AnalysisResult {
        match EncodedImage::parse(image) {
            Ok(image) => self.analyze(&image).await,
            Err(e) => fallback(AnalysisFailure::Malformed(e.to_string())),
        }
    }

    /// The fallible call behind [`Analyzer::analyze`]
    pub async fn try_analyze(&self, image: &EncodedImage) -> Result<AnalysisResult, AnalysisFailure> {
        let body = AnalyzeRequest {
            image: Some(image.payload().to_string()),
        };

        debug!(endpoint = %self.endpoint, bytes = image.payload().len(), "sending analysis request");

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisFailure::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AnalysisFailure::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_error_body(status.as_u16(), &text));
        }

        let result: AnalysisResult =
            serde_json::from_str(&text).map_err(|e| AnalysisFailure::Malformed(e.to_string()))?;
        result.validate().map_err(AnalysisFailure::Malformed)?;

        Ok(result)
    }
}

#[async_trait]
impl Analyzer for AnalysisClient {
    async fn analyze(&self, image: &EncodedImage) -> AnalysisResult {
        match self.try_analyze(image).await {
            Ok(result) => {
                info!(title = %result.title, danger = result.danger_level, "analysis complete");
                result
            }
            Err(failure) => fallback(failure),
        }
    }
}

fn fallback(failure: AnalysisFailure) -> AnalysisResult {
    warn!(kind = failure.kind().code(), error = %failure, "analysis failed, using fallback report");
    AnalysisResult::fallback(&failure)
}

/// Turn a non-2xx proxy response into a failure. The proxy flags missing
/// credentials with `CONFIG_ERROR`; everything else is an upstream failure.
fn classify_error_body(status: u16, text: &str) -> AnalysisFailure {
    let body: ErrorBody = serde_json::from_str(text).unwrap_or_default();

    let message = body
        .details
        .or(body.error)
        .unwrap_or_else(|| format!("HTTP error! status: {}", status));

    if body.error_code.as_deref() == Some("CONFIG_ERROR") {
        AnalysisFailure::Configuration(message)
    } else {
        AnalysisFailure::Upstream { status, message }
    }
}
