//! Analysis pipeline: parsed workbook → player resolution → point
//! calculation → aggregate report.
//!
//! Pure over its inputs: one pass over the rows, then aggregation. The
//! directory snapshot is read-only, so repeated analyses of the same file
//! against the same snapshot produce identical reports (modulo id and
//! timestamp).

use tracing::debug;

use crate::config::CompetitionStore;
use crate::directory::{is_plausible_passport, DirectorySnapshot, PlayerResolver, Resolution};
use crate::report::{
    AnalysisResult, AnalysisSummary, MatchReport, PlayerMatching, TabBreakdown,
};
use crate::scoring::{self, ScoringPolicy};
use crate::workbook::{MatchType, Workbook};

/// Run the full analysis over a parsed workbook.
pub fn analyze(
    workbook: &Workbook,
    snapshot: &DirectorySnapshot,
    competitions: &CompetitionStore,
    policy: &ScoringPolicy,
) -> AnalysisResult {
    let mut warnings = workbook.warnings.clone();
    let mut resolver = PlayerResolver::new(snapshot);
    let mut matches = Vec::new();
    let mut tab_breakdown = Vec::new();

    for tab in &workbook.tabs {
        let multiplier = competitions.multiplier_for(&tab.name);
        let mut singles = 0usize;
        let mut doubles = 0usize;

        for row in &tab.rows {
            match row.match_type {
                MatchType::Singles => singles += 1,
                MatchType::Doubles => doubles += 1,
            }

            let side1: Vec<Resolution> = row
                .side1
                .iter()
                .map(|p| resolver.resolve(&p.passport).clone())
                .collect();
            let side2: Vec<Resolution> = row
                .side2
                .iter()
                .map(|p| resolver.resolve(&p.passport).clone())
                .collect();

            let calculation = scoring::calculate(row, &side1, &side2, multiplier, policy);

            matches.push(MatchReport {
                tab: row.tab.clone(),
                row_number: row.row_number,
                match_type: row.match_type,
                side1: row.side1.iter().map(|p| p.passport.clone()).collect(),
                side2: row.side2.iter().map(|p| p.passport.clone()).collect(),
                score1: row.score1,
                score2: row.score2,
                notes: row.notes.clone(),
                calculation,
            });
        }

        tab_breakdown.push(TabBreakdown {
            name: tab.name.clone(),
            match_count: tab.rows.len(),
            singles_matches: singles,
            doubles_matches: doubles,
            multiplier,
        });
    }

    for code in resolver.seen() {
        if !is_plausible_passport(code) {
            warnings.push(format!("Passport code '{}' has an unexpected format", code));
        }
    }

    let matched = resolver.matched();
    let unmatched = resolver.unmatched();

    let singles_matches: usize = tab_breakdown.iter().map(|t| t.singles_matches).sum();
    let doubles_matches: usize = tab_breakdown.iter().map(|t| t.doubles_matches).sum();
    // Point values are per winning player, so a doubles row awards its
    // ranking/pickle value twice. The totals here must equal what a commit
    // of this workbook hands out.
    let total_ranking: u32 = matches
        .iter()
        .filter_map(|m| {
            let winners = m.side1.len() as u32;
            m.calculation.ranking_points.map(|points| points * winners)
        })
        .sum();
    let total_pickle: u32 = matches
        .iter()
        .filter_map(|m| {
            let winners = m.side1.len() as u32;
            m.calculation.pickle_points.map(|points| points * winners)
        })
        .sum();

    let ready_to_import =
        unmatched.is_empty() && matches.iter().all(|m| m.calculation.can_calculate);

    debug!(
        "Analyzed {} matches across {} tabs ({} unmatched players, ready={})",
        matches.len(),
        workbook.tabs.len(),
        unmatched.len(),
        ready_to_import
    );

    AnalysisResult {
        id: AnalysisResult::new_id(),
        analyzed_at: crate::report::now_iso8601(),
        summary: AnalysisSummary {
            total_tabs: workbook.tabs.len(),
            total_matches: matches.len(),
            singles_matches,
            doubles_matches,
            unique_players: resolver.seen().len(),
            matched_players: matched.len(),
            unmatched_players: unmatched.len(),
            total_ranking_points_to_award: total_ranking,
            total_pickle_points_to_award: total_pickle,
        },
        tab_breakdown,
        player_matching: PlayerMatching { matched, unmatched },
        matches,
        warnings,
        ready_to_import,
    }
}
