//! Soulscan: selfie roast scanner
//!
//! Camera session state machine → analysis client → analysis proxy → hosted
//! multimodal model. Every failure after a successful capture comes back as a
//! themed fallback report; only camera acquisition can end in the error stage.

pub mod core;
pub mod types;

// =============================================================================
// DANGER LEVEL
// =============================================================================

/// Lowest danger level a genuine report is expected to carry
pub const DANGER_LEVEL_MIN: i64 = 60;

/// Highest danger level a genuine report is expected to carry
pub const DANGER_LEVEL_MAX: i64 = 100;

/// Out-of-range sentinel carried by every fallback report
pub const FALLBACK_DANGER_LEVEL: i64 = 999;

// =============================================================================
// SESSION TIMING
// =============================================================================

/// Cadence of the cosmetic progress text while processing (milliseconds)
pub const PROGRESS_INTERVAL_MS: u64 = 800;

/// Pause between analysis resolving and the report being shown (milliseconds)
pub const REVEAL_DELAY_MS: u64 = 1000;

/// Default JPEG quality for captured frames (1-100)
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

// =============================================================================
// HTTP
// =============================================================================

/// Path the proxy serves analysis on
pub const ANALYZE_PATH: &str = "/api/analyze";

/// Largest request body the proxy accepts (a base64 selfie plus JSON framing)
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Default timeout for one analysis round trip (seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
