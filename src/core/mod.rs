//! Core modules for soulscan

pub mod capture;
pub mod client;
pub mod upstream;
pub mod proxy;
pub mod progress;
pub mod session;

pub use capture::{encode_jpeg, ActiveStream, CameraBackend, CaptureAdapter, MediaStream, StillCamera};
pub use client::{AnalysisClient, AnalyzeRequest, Analyzer, ClientConfig};
pub use upstream::{build_model, parse_reply, ModelConfig, Provider, VisionModel};
pub use proxy::{create_router, run_server, ProxyConfig, ProxyError, Upstream};
pub use progress::{default_script, ProgressTicker};
pub use session::{ResetMode, Session, SessionConfig, SharedSession};
