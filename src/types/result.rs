//! Analysis result: the report shape shared by proxy, client and session

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::types::{AnalysisFailure, FailureKind};
use crate::{DANGER_LEVEL_MAX, DANGER_LEVEL_MIN, FALLBACK_DANGER_LEVEL};

/// Extension field: score as a human, lower is funnier
pub const FIELD_SCORE: &str = "score";
/// Extension field: an absurd lucky item
pub const FIELD_LUCKY_ITEM: &str = "luckyItem";
/// Extension field: the creature the subject resembles
pub const FIELD_ANIMAL_MATCH: &str = "animalMatch";

/// One roast report.
///
/// `title`, `roast` and `dangerLevel` are always present. Anything else the
/// backend sends (`score`, `luckyItem`, `animalMatch`, ...) lands in `extras`
/// and is only rendered when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Short label
    pub title: String,
    /// Two or three sentences of roast
    pub roast: String,
    /// Nominally 60-100; fallbacks carry an out-of-range sentinel
    #[serde(rename = "dangerLevel", deserialize_with = "lenient_int")]
    pub danger_level: i64,
    /// Optional fields, as sent
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

impl AnalysisResult {
    /// Create a result with only the required fields
    pub fn new(title: impl Into<String>, roast: impl Into<String>, danger_level: i64) -> Self {
        Self {
            title: title.into(),
            roast: roast.into(),
            danger_level,
            extras: Map::new(),
        }
    }

    /// Attach an extension field
    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extras.insert(key.to_string(), value.into());
        self
    }

    /// Themed stand-in report for a failed analysis.
    ///
    /// Keeps the joke going but never passes for a genuine reading: the danger
    /// level is always the out-of-range sentinel.
    pub fn fallback(failure: &AnalysisFailure) -> Self {
        let detail = failure.detail();
        match failure.kind() {
            FailureKind::Configuration => Self::new(
                "审判庭未授权",
                format!(
                    "灵魂扫描仪的通行证不翼而飞（{}）。这次不是你的脸有问题，是我们把钥匙弄丢了。",
                    detail
                ),
                FALLBACK_DANGER_LEVEL,
            )
            .with_extra(FIELD_SCORE, 0)
            .with_extra(FIELD_LUCKY_ITEM, "失踪的密钥")
            .with_extra(FIELD_ANIMAL_MATCH, "看门的咸鱼"),
            FailureKind::Transport | FailureKind::Upstream | FailureKind::Malformed => Self::new(
                "系统崩溃",
                format!(
                    "扫描中断：{}。可能是信号太差，也可能是你的长相把 AI 吓得当场宕机。",
                    detail
                ),
                FALLBACK_DANGER_LEVEL,
            )
            .with_extra(FIELD_SCORE, 0)
            .with_extra(FIELD_LUCKY_ITEM, "路由器重启按钮")
            .with_extra(FIELD_ANIMAL_MATCH, "断网的恐龙"),
        }
    }

    /// Whether the danger level lies in the range genuine reports use
    pub fn danger_in_range(&self) -> bool {
        (DANGER_LEVEL_MIN..=DANGER_LEVEL_MAX).contains(&self.danger_level)
    }

    /// Whether this is a failure stand-in (danger level past 100 or below 0)
    pub fn is_fallback(&self) -> bool {
        !(0..=DANGER_LEVEL_MAX).contains(&self.danger_level)
    }

    /// Danger level clamped for drawing a 0-100 bar
    pub fn danger_bar_percent(&self) -> u8 {
        self.danger_level.clamp(0, 100) as u8
    }

    pub fn score(&self) -> Option<i64> {
        self.extras.get(FIELD_SCORE).and_then(int_from_value)
    }

    pub fn lucky_item(&self) -> Option<&str> {
        self.extras.get(FIELD_LUCKY_ITEM).and_then(Value::as_str)
    }

    pub fn animal_match(&self) -> Option<&str> {
        self.extras.get(FIELD_ANIMAL_MATCH).and_then(Value::as_str)
    }

    /// Reject shapes that deserialize but carry nothing to show
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is empty".to_string());
        }
        if self.roast.trim().is_empty() {
            return Err("roast is empty".to_string());
        }
        Ok(())
    }
}

/// Integer from a JSON number, a float (rounded) or a numeric string.
///
/// Models asked for "an integer between 60 and 100" answer `"87"` about as
/// often as `87`.
pub fn int_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64),
        _ => None,
    }
}

fn lenient_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    int_from_value(&value)
        .ok_or_else(|| D::Error::custom(format!("expected an integer, got {}", value)))
}
