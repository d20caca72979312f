//! Session stage definitions

use serde::{Deserialize, Serialize};

/// The five stages of a scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Waiting for the user to start a scan
    Intro,
    /// Camera is live, waiting for the capture trigger
    CapturingVideo,
    /// Frame captured, analysis in flight
    Processing,
    /// Report available (genuine or fallback)
    Result,
    /// Camera could not be opened
    Error,
}

impl Stage {
    /// Whether `next` is a legal successor of this stage.
    ///
    /// Transitions only move forward; the way back is an explicit reset
    /// from `Result` or `Error` (which may immediately re-enter capture).
    pub fn can_transition_to(&self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Intro, Stage::CapturingVideo)
                | (Stage::Intro, Stage::Error)
                | (Stage::CapturingVideo, Stage::Processing)
                | (Stage::Processing, Stage::Result)
                | (Stage::Result, Stage::Intro)
                | (Stage::Error, Stage::Intro)
        )
    }

    /// Whether the camera may be held in this stage
    pub fn holds_camera(&self) -> bool {
        *self == Stage::CapturingVideo
    }

    /// Whether a reset is honored in this stage
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Result | Stage::Error)
    }

    /// Get emoji for stage
    pub fn emoji(&self) -> &'static str {
        match self {
            Stage::Intro => "💀",
            Stage::CapturingVideo => "📷",
            Stage::Processing => "⚙",
            Stage::Result => "📋",
            Stage::Error => "⚠",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Intro => "INTRO",
            Stage::CapturingVideo => "CAPTURING_VIDEO",
            Stage::Processing => "PROCESSING",
            Stage::Result => "RESULT",
            Stage::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

/// Observable snapshot of a session, published on every change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Current stage
    pub stage: Stage,
    /// Advisory progress text, only set while processing
    pub loading_message: Option<String>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            stage: Stage::Intro,
            loading_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Stage; 5] = [
        Stage::Intro,
        Stage::CapturingVideo,
        Stage::Processing,
        Stage::Result,
        Stage::Error,
    ];

    #[test]
    fn test_forward_path_is_legal() {
        assert!(Stage::Intro.can_transition_to(Stage::CapturingVideo));
        assert!(Stage::CapturingVideo.can_transition_to(Stage::Processing));
        assert!(Stage::Processing.can_transition_to(Stage::Result));
        assert!(Stage::Result.can_transition_to(Stage::Intro));
    }

    #[test]
    fn test_error_only_reachable_from_intro() {
        for from in ALL {
            let legal = from.can_transition_to(Stage::Error);
            assert_eq!(legal, from == Stage::Intro, "{} -> ERROR", from);
        }
    }

    #[test]
    fn test_processing_only_exits_to_result() {
        for to in ALL {
            assert_eq!(Stage::Processing.can_transition_to(to), to == Stage::Result);
        }
    }

    #[test]
    fn test_no_self_transitions() {
        for stage in ALL {
            assert!(!stage.can_transition_to(stage));
        }
    }

    #[test]
    fn test_only_capturing_holds_camera() {
        for stage in ALL {
            assert_eq!(stage.holds_camera(), stage == Stage::CapturingVideo);
        }
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Stage::CapturingVideo).unwrap();
        assert_eq!(json, "\"CAPTURING_VIDEO\"");
        assert_eq!(Stage::CapturingVideo.to_string(), "CAPTURING_VIDEO");
    }
}
