//! Capture device adapter
//!
//! Owns the camera: acquires a stream (preferred mode first, then any video
//! device), turns the current frame into a JPEG, and stops every track on
//! release. Backends plug in through [`CameraBackend`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::types::{
    CameraError, CapturePreference, CaptureError, EncodedImage, FacingMode, RawFrame,
    VideoConstraints,
};

/// A source of camera streams
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Open one stream satisfying `constraints`
    async fn open(&self, constraints: &VideoConstraints) -> Result<Box<dyn MediaStream>, CameraError>;
}

/// A live stream of video tracks
pub trait MediaStream: Send {
    /// Device label, for logs
    fn label(&self) -> &str;

    /// Read the frame currently on the rendering surface
    fn grab_frame(&mut self) -> Result<RawFrame, CameraError>;

    /// Stop every underlying track
    fn stop_tracks(&mut self);
}

/// An acquired stream. Tracks are stopped exactly once, on the first
/// `release` or on drop, whichever comes first.
pub struct ActiveStream {
    inner: Box<dyn MediaStream>,
    constraints: VideoConstraints,
    released: bool,
}

impl ActiveStream {
    fn new(inner: Box<dyn MediaStream>, constraints: VideoConstraints) -> Self {
        Self {
            inner,
            constraints,
            released: false,
        }
    }

    /// Constraints the stream was actually opened with
    pub fn constraints(&self) -> VideoConstraints {
        self.constraints
    }

    pub fn label(&self) -> &str {
        self.inner.label()
    }

    pub fn is_live(&self) -> bool {
        !self.released
    }

    /// Stop all tracks. Returns false if they were already stopped.
    fn stop(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.inner.stop_tracks();
        self.released = true;
        true
    }
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        if self.stop() {
            debug!(device = %self.inner.label(), "stream stopped on drop");
        }
    }
}

impl std::fmt::Debug for ActiveStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveStream")
            .field("label", &self.inner.label())
            .field("constraints", &self.constraints)
            .field("released", &self.released)
            .finish()
    }
}

/// Capture device adapter over a camera backend
#[derive(Clone)]
pub struct CaptureAdapter {
    backend: Arc<dyn CameraBackend>,
}

impl CaptureAdapter {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self { backend }
    }

    /// Open a stream, trying the preferred mode first and then any video
    /// device. Fails only when neither attempt opens a camera.
    pub async fn acquire(&self, preference: &CapturePreference) -> Result<ActiveStream, CaptureError> {
        let preferred = preference.preferred_constraints();

        let first_error = match self.backend.open(&preferred).await {
            Ok(stream) => {
                info!(device = %stream.label(), facing = ?preferred.facing, "camera acquired");
                return Ok(ActiveStream::new(stream, preferred));
            }
            Err(e) => e,
        };

        if preferred.is_any() {
            warn!(error = %first_error, "camera unavailable");
            return Err(CaptureError::DeviceUnavailable(first_error.to_string()));
        }

        warn!(error = %first_error, facing = ?preferred.facing, "preferred camera mode failed, falling back to any video device");

        let fallback = VideoConstraints::any();
        match self.backend.open(&fallback).await {
            Ok(stream) => {
                info!(device = %stream.label(), "camera acquired with fallback constraints");
                Ok(ActiveStream::new(stream, fallback))
            }
            Err(e) => {
                warn!(error = %e, "camera unavailable");
                Err(CaptureError::DeviceUnavailable(format!("{}; fallback: {}", first_error, e)))
            }
        }
    }

    /// Encode the current frame as JPEG. `quality` is clamped to 1-100;
    /// lower values shrink the upload at the cost of detail. Leaves the
    /// stream running.
    pub fn capture_frame(&self, stream: &mut ActiveStream, quality: u8) -> Result<EncodedImage, CaptureError> {
        if !stream.is_live() {
            return Err(CaptureError::StreamReleased);
        }

        let frame = stream
            .inner
            .grab_frame()
            .map_err(|e| CaptureError::FrameUnavailable(e.to_string()))?;

        let bytes = encode_jpeg(frame, quality)?;
        debug!(bytes = bytes.len(), quality, "frame captured");
        Ok(EncodedImage::from_bytes("image/jpeg", &bytes))
    }

    /// Stop every track of the stream. Safe to call repeatedly.
    pub fn release(&self, stream: &mut ActiveStream) {
        if stream.stop() {
            info!(device = %stream.label(), "camera released");
        }
    }
}

/// Encode an RGB frame as JPEG
pub fn encode_jpeg(frame: RawFrame, quality: u8) -> Result<Vec<u8>, CaptureError> {
    if !frame.is_complete() {
        return Err(CaptureError::FrameUnavailable(format!(
            "incomplete {}x{} frame ({} bytes)",
            frame.width,
            frame.height,
            frame.rgb.len()
        )));
    }

    let image = RgbImage::from_raw(frame.width, frame.height, frame.rgb)
        .ok_or_else(|| CaptureError::Encode("frame buffer does not match dimensions".to_string()))?;

    let mut buf = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
        encoder
            .encode_image(&image)
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
    }

    Ok(buf)
}

// =============================================================================
// STILL IMAGE CAMERA
// =============================================================================

/// Camera backend that plays back a single image file.
///
/// Reports a fixed facing direction (or none); a request for a different
/// facing fails with `ConstraintUnsatisfied` so the adapter falls back.
/// Frames wider than the width hint are downscaled.
#[derive(Debug, Clone)]
pub struct StillCamera {
    path: PathBuf,
    facing: Option<FacingMode>,
}

impl StillCamera {
    pub fn new(path: impl AsRef<Path>, facing: Option<FacingMode>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            facing,
        }
    }
}

#[async_trait]
impl CameraBackend for StillCamera {
    async fn open(&self, constraints: &VideoConstraints) -> Result<Box<dyn MediaStream>, CameraError> {
        if let Some(wanted) = constraints.facing {
            if self.facing != Some(wanted) {
                return Err(CameraError::ConstraintUnsatisfied(format!(
                    "no {}-facing camera",
                    wanted
                )));
            }
        }

        let bytes = tokio::fs::read(&self.path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CameraError::NotFound,
            std::io::ErrorKind::PermissionDenied => CameraError::PermissionDenied,
            _ => CameraError::Device(e.to_string()),
        })?;

        let mut frame = image::load_from_memory(&bytes)
            .map_err(|e| CameraError::Device(e.to_string()))?
            .to_rgb8();

        if let Some(max_width) = constraints.ideal_width.filter(|w| *w > 0) {
            if frame.width() > max_width {
                let height = (frame.height() as u64 * max_width as u64 / frame.width() as u64).max(1) as u32;
                frame = image::imageops::resize(&frame, max_width, height, FilterType::Triangle);
            }
        }

        Ok(Box::new(StillStream {
            label: self.path.display().to_string(),
            frame,
            live: true,
        }))
    }
}

struct StillStream {
    label: String,
    frame: RgbImage,
    live: bool,
}

impl MediaStream for StillStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn grab_frame(&mut self) -> Result<RawFrame, CameraError> {
        if !self.live {
            return Err(CameraError::Device("track ended".to_string()));
        }
        Ok(RawFrame::new(
            self.frame.width(),
            self.frame.height(),
            self.frame.as_raw().clone(),
        ))
    }

    fn stop_tracks(&mut self) {
        self.live = false;
    }
}

// =============================================================================
// TESTS
// =============================================================================
