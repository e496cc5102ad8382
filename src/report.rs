//! Wire types for the analysis report.
//!
//! These are the shapes the admin UI renders: summary counts, per-tab
//! breakdown, player matching lists, per-row calculations, and the
//! ready-to-import flag.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::directory::ResolvedPlayer;
use crate::scoring::PointsCalculation;
use crate::workbook::MatchType;

/// Generate ISO8601 timestamp for current time.
pub fn now_iso8601() -> String {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let days_since_epoch = secs / 86400;
    let time_of_day = secs % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    let mut year = 1970i32;
    let mut remaining_days = days_since_epoch as i32;

    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining_days < days_in_year {
            break;
        }
        remaining_days -= days_in_year;
        year += 1;
    }

    let days_in_months: [i32; 12] = if is_leap_year(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };

    let mut month = 1;
    for days in days_in_months {
        if remaining_days < days {
            break;
        }
        remaining_days -= days;
        month += 1;
    }
    let day = remaining_days + 1;

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year, month, day, hours, minutes, seconds
    )
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

/// Top-level aggregate produced by one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub id: String,
    pub analyzed_at: String, // ISO8601 timestamp
    pub summary: AnalysisSummary,
    pub tab_breakdown: Vec<TabBreakdown>,
    pub player_matching: PlayerMatching,
    pub matches: Vec<MatchReport>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub ready_to_import: bool,
}

impl AnalysisResult {
    pub fn new_id() -> String {
        format!("analysis_{}", Uuid::new_v4().simple())
    }
}

/// Summary counts over the whole workbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub total_tabs: usize,
    pub total_matches: usize,
    pub singles_matches: usize,
    pub doubles_matches: usize,
    pub unique_players: usize,
    pub matched_players: usize,
    pub unmatched_players: usize,
    /// Summed over every winning player, so it matches what a commit of
    /// this workbook awards.
    pub total_ranking_points_to_award: u32,
    pub total_pickle_points_to_award: u32,
}

/// Per-tab match counts and the multiplier that applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabBreakdown {
    pub name: String,
    pub match_count: usize,
    pub singles_matches: usize,
    pub doubles_matches: usize,
    pub multiplier: f64,
}

/// Matched and unmatched passport codes, each list unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMatching {
    pub matched: Vec<ResolvedPlayer>,
    pub unmatched: Vec<String>,
}

/// One match row with its calculation attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    pub tab: String,
    pub row_number: u32,
    pub match_type: MatchType,
    pub side1: Vec<String>,
    pub side2: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score1: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score2: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub calculation: PointsCalculation,
}

/// HTTP envelope for the analyze endpoint. On failure only `success`,
/// `analysisMode`, `fileName`, and `error` are present — no partial report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub success: bool,
    pub analysis_mode: String,
    pub file_name: String,
    #[serde(flatten)]
    pub result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalyzeResponse {
    pub fn ok(file_name: String, result: AnalysisResult) -> Self {
        Self {
            success: true,
            analysis_mode: "analysis_only".to_string(),
            file_name,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(file_name: String, error: String) -> Self {
        Self {
            success: false,
            analysis_mode: "analysis_only".to_string(),
            file_name,
            result: None,
            error: Some(error),
        }
    }
}
