//! Issued reports and their terminal rendering

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::types::{AnalysisResult, EncodedImage};

/// Width of the hopelessness bar in terminal cells
const BAR_CELLS: usize = 20;

/// A result as issued to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Four-digit report number derived from the captured frame
    pub number: u16,
    /// When the report was issued
    pub issued_at: DateTime<Utc>,
    /// The result itself, genuine or fallback
    pub result: AnalysisResult,
}

impl SessionReport {
    /// Issue a report for the frame it was produced from
    pub fn issue(frame: &EncodedImage, result: AnalysisResult) -> Self {
        Self {
            number: report_number(frame),
            issued_at: Utc::now(),
            result,
        }
    }

    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let r = &self.result;
        let mut out = String::new();

        out.push_str(&format!(
            "{}\n",
            format!("ANALYSIS REPORT #{:04}", self.number).green().dimmed()
        ));
        out.push_str(&format!("{}\n", r.title.white().bold()));
        out.push_str(&format!("{}\n", "─".repeat(40).green()));

        let filled = r.danger_bar_percent() as usize * BAR_CELLS / 100;
        let bar = format!("{}{}", "█".repeat(filled), "░".repeat(BAR_CELLS - filled));
        out.push_str(&format!(
            "废柴指数 (Hopelessness) {} {}\n",
            bar.red(),
            format!("{}%", r.danger_level).red().bold()
        ));

        out.push_str(&format!("\n{}\n\n", r.roast.bright_green()));

        if let Some(score) = r.score() {
            out.push_str(&format!("{} {}\n", "人类评分:".green(), score));
        }
        if let Some(item) = r.lucky_item() {
            out.push_str(&format!("{} {}\n", "幸运物品:".green(), item));
        }
        if let Some(animal) = r.animal_match() {
            out.push_str(&format!("{} {}\n", "匹配生物:".green(), animal));
        }

        out.push_str(&format!(
            "{}",
            "* 此结果由AI随口胡诌，如有雷同，纯属你倒霉。*".green().dimmed()
        ));
        out
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        let r = &self.result;
        let mut line = format!(
            "report={:04} | title={} | danger={} | fallback={}",
            self.number,
            r.title,
            r.danger_level,
            r.is_fallback()
        );
        if let Some(score) = r.score() {
            line.push_str(&format!(" | score={}", score));
        }
        if let Some(item) = r.lucky_item() {
            line.push_str(&format!(" | lucky_item={}", item));
        }
        if let Some(animal) = r.animal_match() {
            line.push_str(&format!(" | animal_match={}", animal));
        }
        line.push_str(&format!(" | roast={}", r.roast));
        line
    }
}

/// Report number in 0..10000 from the frame fingerprint
pub fn report_number(frame: &EncodedImage) -> u16 {
    let digest = frame.fingerprint();
    u16::from_be_bytes([digest[0], digest[1]]) % 10_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::result::{FIELD_ANIMAL_MATCH, FIELD_LUCKY_ITEM};

    fn frame() -> EncodedImage {
        EncodedImage::from_bytes("image/jpeg", b"frame bytes")
    }

    #[test]
    fn test_report_number_stable_per_frame() {
        assert_eq!(report_number(&frame()), report_number(&frame()));
        assert!(report_number(&frame()) < 10_000);
    }

    #[test]
    fn test_parseable_core_only() {
        let report = SessionReport::issue(&frame(), AnalysisResult::new("长得潦草", "roast", 87));
        let line = report.to_parseable_string();
        assert!(line.contains("title=长得潦草"));
        assert!(line.contains("danger=87"));
        assert!(line.contains("fallback=false"));
        assert!(!line.contains("lucky_item"));
        assert!(!line.contains("score"));
    }

    #[test]
    fn test_parseable_with_extras() {
        let result = AnalysisResult::new("t", "r", 70)
            .with_extra(FIELD_LUCKY_ITEM, "别人的WIFI密码")
            .with_extra(FIELD_ANIMAL_MATCH, "土拨鼠");
        let line = SessionReport::issue(&frame(), result).to_parseable_string();
        assert!(line.contains("lucky_item=别人的WIFI密码"));
        assert!(line.contains("animal_match=土拨鼠"));
    }

    #[test]
    fn test_terminal_renders_sentinel() {
        let report = SessionReport::issue(&frame(), AnalysisResult::new("系统崩溃", "r", 999));
        let text = report.to_terminal_string();
        assert!(text.contains("999%"));
        assert!(text.contains(&"█".repeat(BAR_CELLS)));
    }
}
