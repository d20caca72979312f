//! Session state machine
//!
//! Stage transitions:
//! - INTRO → CAPTURING_VIDEO: start, camera acquired
//! - INTRO → ERROR: start, no camera could be opened
//! - CAPTURING_VIDEO → PROCESSING: capture (frame grabbed, camera released)
//! - PROCESSING → RESULT: analysis resolved, genuine or fallback
//! - RESULT / ERROR → INTRO: reset (or straight back to CAPTURING_VIDEO
//!   when the session restarts capture on reset)
//!
//! Triggers that don't apply to the current stage are ignored.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::capture::{ActiveStream, CaptureAdapter};
use crate::core::client::Analyzer;
use crate::core::progress::{default_script, ProgressTicker};
use crate::types::{
    AnalysisFailure, AnalysisResult, CapturePreference, CaptureError, EncodedImage, SessionError,
    SessionReport, SessionStatus, Stage,
};
use crate::{DEFAULT_JPEG_QUALITY, PROGRESS_INTERVAL_MS, REVEAL_DELAY_MS};

/// A session shared between the presentation layer and input handlers
pub type SharedSession = Arc<Mutex<Session>>;

/// What reset does after clearing the report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Back to the intro screen
    Intro,
    /// Straight back to a live camera
    Recapture,
}

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub preference: CapturePreference,
    /// JPEG quality for the captured frame (1-100)
    pub jpeg_quality: u8,
    /// Progress text cadence while processing
    pub progress_interval: Duration,
    /// Pause between analysis resolving and the report showing
    pub reveal_delay: Duration,
    pub reset_mode: ResetMode,
    /// Loading message shown as soon as processing starts
    pub initial_message: String,
    pub progress_script: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            preference: CapturePreference::front(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            progress_interval: Duration::from_millis(PROGRESS_INTERVAL_MS),
            reveal_delay: Duration::from_millis(REVEAL_DELAY_MS),
            reset_mode: ResetMode::Intro,
            initial_message: "Initializing...".to_string(),
            progress_script: default_script(),
        }
    }
}

/// Analysis running on behalf of the processing stage. Owned by the session,
/// so it survives the caller dropping a `capture` future.
struct InFlight {
    frame: EncodedImage,
    task: JoinHandle<AnalysisResult>,
    resolved: Option<AnalysisResult>,
}

/// The single live interaction: stage, camera, last report
pub struct Session {
    stage: Stage,
    stream: Option<ActiveStream>,
    in_flight: Option<InFlight>,
    last_report: Option<SessionReport>,
    ticker: Option<ProgressTicker>,
    status: Arc<watch::Sender<SessionStatus>>,
    capture: CaptureAdapter,
    analyzer: Arc<dyn Analyzer>,
    config: SessionConfig,
    last_error: Option<String>,
}

impl Session {
    /// Create a session in the intro stage
    pub fn new(capture: CaptureAdapter, analyzer: Arc<dyn Analyzer>, config: SessionConfig) -> Self {
        let (tx, _) = watch::channel(SessionStatus::default());
        Self {
            stage: Stage::Intro,
            stream: None,
            in_flight: None,
            last_report: None,
            ticker: None,
            status: Arc::new(tx),
            capture,
            analyzer,
            config,
            last_error: None,
        }
    }

    /// Wrap in a mutex for sharing between tasks
    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Report of the last completed scan, cleared on reset
    pub fn last_report(&self) -> Option<&SessionReport> {
        self.last_report.as_ref()
    }

    pub fn last_result(&self) -> Option<&AnalysisResult> {
        self.last_report.as_ref().map(|r| &r.result)
    }

    /// Why the camera could not be opened, while in the error stage
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Current advisory loading text
    pub fn loading_message(&self) -> Option<String> {
        self.status.borrow().loading_message.clone()
    }

    /// Watch stage and loading text without holding the session
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Whether a camera stream is currently held
    pub fn camera_active(&self) -> bool {
        self.stream.as_ref().map(|s| s.is_live()).unwrap_or(false)
    }

    /// Whether the progress ticker is still running
    pub fn progress_active(&self) -> bool {
        self.ticker.as_ref().map(|t| t.is_running()).unwrap_or(false)
    }

    fn enter(&mut self, next: Stage) {
        let from = self.stage;
        debug_assert!(from.can_transition_to(next), "illegal transition {} -> {}", from, next);
        debug_assert!(
            self.stream.is_none() || next.holds_camera(),
            "camera still held entering {}",
            next
        );
        self.stage = next;
        self.status.send_modify(|s| {
            s.stage = next;
            if next != Stage::Processing {
                s.loading_message = None;
            }
        });
        info!(from = %from, to = %next, "stage transition");
    }

    fn release_camera(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            self.capture.release(&mut stream);
        }
    }

    async fn stop_progress(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel().await;
        }
    }

    /// User start action. Acquires the camera; on failure goes straight to
    /// the error stage.
    pub async fn start(&mut self) -> Stage {
        if self.stage != Stage::Intro {
            debug!(stage = %self.stage, "start ignored");
            return self.stage;
        }

        // At most one stream per session
        self.release_camera();

        match self.capture.acquire(&self.config.preference).await {
            Ok(stream) => {
                self.last_error = None;
                self.stream = Some(stream);
                self.enter(Stage::CapturingVideo);
            }
            Err(e) => {
                warn!(error = %e, "camera acquisition failed");
                self.last_error = Some(e.to_string());
                self.enter(Stage::Error);
            }
        }
        self.stage
    }

    /// User capture action.
    ///
    /// Grabs one frame, releases the camera, then analyzes. Resolves once
    /// the report is in. Honored once per visit to the capturing stage; a
    /// frame grab failure leaves the camera live and the stage unchanged.
    ///
    /// The analysis runs as a task the session owns. If this future is
    /// dropped mid-flight the session stays in processing, and the next
    /// `capture` or [`Session::resolve`] picks the same analysis back up.
    pub async fn capture(&mut self) -> Result<Stage, SessionError> {
        if self.stage == Stage::Processing {
            return Ok(self.resolve().await);
        }
        if self.stage != Stage::CapturingVideo {
            debug!(stage = %self.stage, "capture ignored");
            return Ok(self.stage);
        }

        let frame = {
            let stream = self.stream.as_mut().ok_or(CaptureError::StreamReleased)?;
            self.capture.capture_frame(stream, self.config.jpeg_quality)?
        };

        // Camera is down before the analysis call goes out
        self.release_camera();

        self.enter(Stage::Processing);
        let initial = self.config.initial_message.clone();
        self.status.send_modify(|s| s.loading_message = Some(initial));
        self.ticker = Some(ProgressTicker::start(
            self.config.progress_script.clone(),
            self.config.progress_interval,
            self.status.clone(),
        ));

        let analyzer = self.analyzer.clone();
        let image = frame.clone();
        self.in_flight = Some(InFlight {
            frame,
            task: tokio::spawn(async move { analyzer.analyze(&image).await }),
            resolved: None,
        });

        Ok(self.resolve().await)
    }

    /// Wait for the in-flight analysis and move on to the result stage.
    /// Outside processing this returns the current stage.
    pub async fn resolve(&mut self) -> Stage {
        let flight = match self.in_flight.as_mut() {
            Some(flight) => flight,
            None => return self.stage,
        };

        if flight.resolved.is_none() {
            let result = match (&mut flight.task).await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "analysis task failed");
                    AnalysisResult::fallback(&AnalysisFailure::Transport(format!(
                        "analysis task failed: {}",
                        e
                    )))
                }
            };
            flight.resolved = Some(result);
        }

        self.stop_progress().await;
        if !self.config.reveal_delay.is_zero() {
            tokio::time::sleep(self.config.reveal_delay).await;
        }

        let flight = match self.in_flight.take() {
            Some(flight) => flight,
            None => return self.stage,
        };
        let result = match flight.resolved {
            Some(result) => result,
            None => return self.stage,
        };

        if result.is_fallback() {
            warn!(title = %result.title, danger = result.danger_level, "showing fallback report");
        }
        self.last_report = Some(SessionReport::issue(&flight.frame, result));
        self.enter(Stage::Result);
        self.stage
    }

    /// User reset action from the result or error stage
    pub async fn reset(&mut self) -> Stage {
        if !self.stage.is_terminal() {
            debug!(stage = %self.stage, "reset ignored");
            return self.stage;
        }

        self.last_report = None;
        self.last_error = None;
        self.stop_progress().await;
        self.release_camera();
        self.enter(Stage::Intro);

        if self.config.reset_mode == ResetMode::Recapture {
            return self.start().await;
        }
        self.stage
    }

    /// Release every resource the session holds. Called on drop.
    pub fn teardown(&mut self) {
        self.release_camera();
        if let Some(flight) = self.in_flight.take() {
            flight.task.abort();
        }
        // Dropping the ticker cancels it
        self.ticker = None;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("stage", &self.stage)
            .field("camera_active", &self.camera_active())
            .field("analysis_in_flight", &self.in_flight.is_some())
            .field("last_report", &self.last_report)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
