//! Ranking and pickle point calculation for resolved match rows.
//!
//! The base constants and bonus factors live in `ScoringPolicy` so the
//! authoritative tournament values can be supplied via environment
//! variables without a rebuild.

use serde::{Deserialize, Serialize};

use crate::directory::{Gender, Resolution};
use crate::workbook::{MatchType, PlayerRef, RawMatchRow};

/// Pluggable scoring constants. `base(match_type) × tab multiplier` gives
/// the ranking points a match awards to each player on the winning side.
#[derive(Debug, Clone)]
pub struct ScoringPolicy {
    pub singles_base: f64,
    pub doubles_base: f64,
    /// Pickle points per ranking point.
    pub pickle_factor: f64,
    /// Multiplier applied when a doubles side pairs both genders.
    pub cross_gender_factor: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            singles_base: 10.0,
            doubles_base: 15.0,
            pickle_factor: 1.5,
            cross_gender_factor: 1.25,
        }
    }
}

impl ScoringPolicy {
    /// Build from `SCORING_*` environment variables, falling back to the
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str, fallback: f64| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(fallback)
        };
        Self {
            singles_base: var("SCORING_SINGLES_BASE", defaults.singles_base),
            doubles_base: var("SCORING_DOUBLES_BASE", defaults.doubles_base),
            pickle_factor: var("SCORING_PICKLE_FACTOR", defaults.pickle_factor),
            cross_gender_factor: var("SCORING_CROSS_GENDER_FACTOR", defaults.cross_gender_factor),
        }
    }

    fn base(&self, match_type: MatchType) -> f64 {
        match match_type {
            MatchType::Singles => self.singles_base,
            MatchType::Doubles => self.doubles_base,
        }
    }
}

/// Derived, read-only calculation attached to each row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsCalculation {
    pub can_calculate: bool,
    /// 1 or 2; absent when the row cannot be calculated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_side: Option<u8>,
    /// Ranking points awarded to each player on the winning side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranking_points: Option<u32>,
    /// Pickle points awarded to each player on the winning side
    /// (ranking points × pickle factor, rounded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickle_points: Option<u32>,
    pub cross_gender_bonus: bool,
    /// Why the row cannot be calculated, for the review UI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PointsCalculation {
    fn blocked(reason: String, cross_gender_bonus: bool) -> Self {
        Self {
            can_calculate: false,
            winner_side: None,
            ranking_points: None,
            pickle_points: None,
            cross_gender_bonus,
            reason: Some(reason),
        }
    }
}

/// Round to whole points, half away from zero.
fn round_points(value: f64) -> u32 {
    value.round() as u32
}

/// Compute the calculation for one row. `side1`/`side2` are the resolutions
/// for the row's players in side order; `multiplier` comes from the tab's
/// competition configuration.
pub fn calculate(
    row: &RawMatchRow,
    side1: &[Resolution],
    side2: &[Resolution],
    multiplier: f64,
    policy: &ScoringPolicy,
) -> PointsCalculation {
    let cross_gender_bonus = row.match_type == MatchType::Doubles
        && (side_is_mixed(&row.side1, side1) || side_is_mixed(&row.side2, side2));

    let unmatched: Vec<&str> = row
        .players()
        .zip(side1.iter().chain(side2.iter()))
        .filter(|(_, resolution)| !resolution.is_matched())
        .map(|(player, _)| player.passport.as_str())
        .collect();
    if !unmatched.is_empty() {
        return PointsCalculation::blocked(
            format!("unmatched players: {}", unmatched.join(", ")),
            cross_gender_bonus,
        );
    }

    let (Some(score1), Some(score2)) = (row.score1, row.score2) else {
        return PointsCalculation::blocked("missing score".to_string(), cross_gender_bonus);
    };

    if score1 == score2 {
        return PointsCalculation::blocked(
            format!("tied score {}-{}", score1, score2),
            cross_gender_bonus,
        );
    }
    let winner_side = if score1 > score2 { 1 } else { 2 };

    let mut ranking = policy.base(row.match_type) * multiplier;
    if cross_gender_bonus {
        ranking *= policy.cross_gender_factor;
    }
    let ranking_points = round_points(ranking);
    let pickle_points = round_points(ranking_points as f64 * policy.pickle_factor);

    PointsCalculation {
        can_calculate: true,
        winner_side: Some(winner_side),
        ranking_points: Some(ranking_points),
        pickle_points: Some(pickle_points),
        cross_gender_bonus,
        reason: None,
    }
}

/// A doubles side is mixed when both players have a known gender and the
/// genders differ. Spreadsheet overrides take precedence over the
/// directory record; unknown gender never triggers the bonus.
fn side_is_mixed(refs: &[PlayerRef], resolutions: &[Resolution]) -> bool {
    if refs.len() != 2 {
        return false;
    }
    let genders: Vec<Option<Gender>> = refs
        .iter()
        .zip(resolutions.iter())
        .map(|(player, resolution)| {
            player.gender_override.or(match resolution {
                Resolution::Matched(resolved) => resolved.gender,
                Resolution::Unmatched => None,
            })
        })
        .collect();
    matches!(
        (genders[0], genders[1]),
        (Some(a), Some(b)) if a != b
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ResolvedPlayer;
    use crate::workbook::PlayerRef;

    fn matched(code: &str, gender: Option<Gender>) -> Resolution {
        Resolution::Matched(ResolvedPlayer {
            passport_code: code.to_string(),
            display_name: format!("Player {}", code),
            gender,
            current_ranking_points: 0,
        })
    }

    fn player_ref(code: &str) -> PlayerRef {
        PlayerRef {
            passport: code.to_string(),
            gender_override: None,
            birthdate_override: None,
        }
    }

    fn singles_row(score1: Option<u32>, score2: Option<u32>) -> RawMatchRow {
        RawMatchRow {
            tab: "Open".to_string(),
            row_number: 2,
            match_type: MatchType::Singles,
            side1: vec![player_ref("AAAAAA")],
            side2: vec![player_ref("BBBBBB")],
            score1,
            score2,
            notes: None,
        }
    }

    fn doubles_row() -> RawMatchRow {
        RawMatchRow {
            tab: "Mixed".to_string(),
            row_number: 2,
            match_type: MatchType::Doubles,
            side1: vec![player_ref("AAAAAA"), player_ref("BBBBBB")],
            side2: vec![player_ref("CCCCCC"), player_ref("DDDDDD")],
            score1: Some(11),
            score2: Some(6),
            notes: None,
        }
    }

    #[test]
    fn test_singles_base_times_multiplier() {
        let row = singles_row(Some(11), Some(7));
        let side1 = [matched("AAAAAA", Some(Gender::Male))];
        let side2 = [matched("BBBBBB", Some(Gender::Male))];
        let calc = calculate(&row, &side1, &side2, 2.0, &ScoringPolicy::default());

        assert!(calc.can_calculate);
        assert_eq!(calc.winner_side, Some(1));
        assert_eq!(calc.ranking_points, Some(20));
        assert_eq!(calc.pickle_points, Some(30));
        assert!(!calc.cross_gender_bonus);
    }

    #[test]
    fn test_unmatched_side_blocks_calculation() {
        let row = singles_row(Some(11), Some(7));
        let side1 = [matched("AAAAAA", None)];
        let side2 = [Resolution::Unmatched];
        let calc = calculate(&row, &side1, &side2, 1.0, &ScoringPolicy::default());

        assert!(!calc.can_calculate);
        assert!(calc.ranking_points.is_none());
        assert!(calc.reason.unwrap().contains("BBBBBB"));
    }

    #[test]
    fn test_missing_score_blocks_calculation() {
        let row = singles_row(Some(11), None);
        let side1 = [matched("AAAAAA", None)];
        let side2 = [matched("BBBBBB", None)];
        let calc = calculate(&row, &side1, &side2, 1.0, &ScoringPolicy::default());
        assert!(!calc.can_calculate);
        assert_eq!(calc.reason.as_deref(), Some("missing score"));
    }

    #[test]
    fn test_tied_score_blocks_calculation() {
        let row = singles_row(Some(9), Some(9));
        let side1 = [matched("AAAAAA", None)];
        let side2 = [matched("BBBBBB", None)];
        let calc = calculate(&row, &side1, &side2, 1.0, &ScoringPolicy::default());
        assert!(!calc.can_calculate);
        assert!(calc.reason.unwrap().starts_with("tied score"));
    }

    #[test]
    fn test_cross_gender_bonus_raises_points() {
        let row = doubles_row();
        let same = [
            matched("AAAAAA", Some(Gender::Male)),
            matched("BBBBBB", Some(Gender::Male)),
        ];
        let same2 = [
            matched("CCCCCC", Some(Gender::Male)),
            matched("DDDDDD", Some(Gender::Male)),
        ];
        let plain = calculate(&row, &same, &same2, 1.0, &ScoringPolicy::default());

        let mixed = [
            matched("AAAAAA", Some(Gender::Male)),
            matched("BBBBBB", Some(Gender::Female)),
        ];
        let bonus = calculate(&row, &mixed, &same2, 1.0, &ScoringPolicy::default());

        assert!(!plain.cross_gender_bonus);
        assert!(bonus.cross_gender_bonus);
        assert_eq!(plain.ranking_points, Some(15));
        // 15 × 1.25 = 18.75 → 19; pickle 19 × 1.5 = 28.5 → 29
        assert_eq!(bonus.ranking_points, Some(19));
        assert_eq!(bonus.pickle_points, Some(29));
        assert!(bonus.ranking_points > plain.ranking_points);
    }

    #[test]
    fn test_gender_override_beats_directory() {
        let mut row = doubles_row();
        row.side1[1].gender_override = Some(Gender::Female);
        let side1 = [
            matched("AAAAAA", Some(Gender::Male)),
            matched("BBBBBB", Some(Gender::Male)),
        ];
        let side2 = [
            matched("CCCCCC", Some(Gender::Male)),
            matched("DDDDDD", Some(Gender::Male)),
        ];
        let calc = calculate(&row, &side1, &side2, 1.0, &ScoringPolicy::default());
        assert!(calc.cross_gender_bonus);
    }

    #[test]
    fn test_unknown_gender_never_triggers_bonus() {
        let row = doubles_row();
        let side1 = [
            matched("AAAAAA", None),
            matched("BBBBBB", Some(Gender::Female)),
        ];
        let side2 = [
            matched("CCCCCC", Some(Gender::Male)),
            matched("DDDDDD", Some(Gender::Male)),
        ];
        let calc = calculate(&row, &side1, &side2, 1.0, &ScoringPolicy::default());
        assert!(!calc.cross_gender_bonus);
    }

    #[test]
    fn test_bonus_flag_set_even_when_blocked() {
        let mut row = doubles_row();
        row.score2 = None;
        let side1 = [
            matched("AAAAAA", Some(Gender::Male)),
            matched("BBBBBB", Some(Gender::Female)),
        ];
        let side2 = [
            matched("CCCCCC", Some(Gender::Male)),
            matched("DDDDDD", Some(Gender::Male)),
        ];
        let calc = calculate(&row, &side1, &side2, 1.0, &ScoringPolicy::default());
        assert!(!calc.can_calculate);
        assert!(calc.cross_gender_bonus);
    }
}
