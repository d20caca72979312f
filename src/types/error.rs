//! Error taxonomy
//!
//! Only `CaptureError::DeviceUnavailable` ever reaches the user as the error
//! stage. Everything downstream of a successful capture is an
//! `AnalysisFailure`, which the analysis client folds into a fallback report.

use thiserror::Error;

/// Failure reported by a camera backend while opening or reading a stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no camera found")]
    NotFound,

    /// The device exists but cannot satisfy the requested mode
    #[error("constraint unsatisfied: {0}")]
    ConstraintUnsatisfied(String),

    #[error("camera device error: {0}")]
    Device(String),
}

/// Failure of the capture device adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// No camera could be opened, preferred mode and fallback both failed
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// Frame requested from a stream whose tracks were already stopped
    #[error("stream already released")]
    StreamReleased,

    /// The stream is live but has no frame to give yet
    #[error("no frame available: {0}")]
    FrameUnavailable(String),

    #[error("frame encoding failed: {0}")]
    Encode(String),
}

/// Coarse classification of an analysis failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    Upstream,
    Malformed,
    Configuration,
}

impl FailureKind {
    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::Transport => "TRANSPORT_FAILURE",
            FailureKind::Upstream => "UPSTREAM_FAILURE",
            FailureKind::Malformed => "MALFORMED_PAYLOAD",
            FailureKind::Configuration => "CONFIGURATION_ERROR",
        }
    }
}

/// Anything that kept an analysis call from producing a genuine report
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisFailure {
    /// The proxy could not be reached
    #[error("transport failure: {0}")]
    Transport(String),

    /// The proxy answered with a non-success status
    #[error("upstream returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The proxy answered 2xx but the body is not a report
    #[error("malformed analysis payload: {0}")]
    Malformed(String),

    /// Credentials are missing on either side of the call
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AnalysisFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            AnalysisFailure::Transport(_) => FailureKind::Transport,
            AnalysisFailure::Upstream { .. } => FailureKind::Upstream,
            AnalysisFailure::Malformed(_) => FailureKind::Malformed,
            AnalysisFailure::Configuration(_) => FailureKind::Configuration,
        }
    }

    /// Human-readable detail without the classification prefix
    pub fn detail(&self) -> &str {
        match self {
            AnalysisFailure::Transport(msg)
            | AnalysisFailure::Malformed(msg)
            | AnalysisFailure::Configuration(msg) => msg,
            AnalysisFailure::Upstream { message, .. } => message,
        }
    }
}

/// Failure of a hosted-model call made by the proxy
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model API error: {status} {body}")]
    Status { status: u16, body: String },

    #[error("model returned no text")]
    EmptyReply,

    #[error("model returned invalid JSON: {0}")]
    InvalidJson(String),
}

/// Invalid configuration detected at construction time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

/// Image payload that cannot be normalized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("image payload is empty")]
    Empty,

    #[error("data URI is not a base64 image: {0}")]
    InvalidDataUri(String),

    #[error("image payload is not valid base64: {0}")]
    InvalidBase64(String),
}

/// Failure of a session action
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
}
