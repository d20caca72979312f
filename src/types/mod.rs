//! Core types for Soulscan

mod stage;
mod error;
pub mod result;
mod image;
mod capture;
mod report;

pub use stage::{Stage, SessionStatus};
pub use error::{
    AnalysisFailure, CameraError, CaptureError, ConfigError, FailureKind, ImageError,
    SessionError, UpstreamError,
};
pub use result::{AnalysisResult, int_from_value};
pub use image::{EncodedImage, DEFAULT_MIME};
pub use capture::{CapturePreference, FacingMode, RawFrame, VideoConstraints};
pub use report::{SessionReport, report_number};
