//! Camera request and frame types

use serde::{Deserialize, Serialize};

/// Which way the camera should face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front-facing, towards the user
    User,
    /// Rear-facing
    Environment,
}

impl std::fmt::Display for FacingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FacingMode::User => write!(f, "user"),
            FacingMode::Environment => write!(f, "environment"),
        }
    }
}

/// What the session would like from the camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturePreference {
    pub facing: Option<FacingMode>,
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
}

impl CapturePreference {
    /// Front camera, no resolution hints
    pub fn front() -> Self {
        Self {
            facing: Some(FacingMode::User),
            ideal_width: None,
            ideal_height: None,
        }
    }

    pub fn with_resolution(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.ideal_width = width;
        self.ideal_height = height;
        self
    }

    /// Constraints for the first, preferred attempt
    pub fn preferred_constraints(&self) -> VideoConstraints {
        VideoConstraints {
            facing: self.facing,
            ideal_width: self.ideal_width,
            ideal_height: self.ideal_height,
        }
    }
}

impl Default for CapturePreference {
    fn default() -> Self {
        Self::front()
    }
}

/// Constraints handed to a camera backend for one open attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    /// Required facing, `None` accepts any device
    pub facing: Option<FacingMode>,
    /// Resolution hints, never required
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
}

impl VideoConstraints {
    /// Any video-capable device
    pub fn any() -> Self {
        Self {
            facing: None,
            ideal_width: None,
            ideal_height: None,
        }
    }

    pub fn is_any(&self) -> bool {
        *self == Self::any()
    }
}

/// One uncompressed RGB8 frame read from a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB, `width * height * 3` bytes
    pub rgb: Vec<u8>,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Self {
        Self { width, height, rgb }
    }

    /// Solid-color frame
    pub fn filled(width: u32, height: u32, pixel: [u8; 3]) -> Self {
        let rgb = pixel
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self { width, height, rgb }
    }

    /// Dimensions are non-zero and the buffer matches them
    pub fn is_complete(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.rgb.len() == self.width as usize * self.height as usize * 3
    }
}
