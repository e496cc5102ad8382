//! Import commit: award points for analyzed matches.
//!
//! The persistence collaborator sits behind the `Committer` trait; the
//! in-process implementation applies awards to the player directory. Rows
//! are committed independently — one bad row never rolls back the others,
//! and the response reports the successful/failed split per row.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::directory::PlayerDirectory;
use crate::report::AnalysisResult;
use crate::workbook::{RawMatchRow, Workbook};

/// Per-batch commit outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResults {
    pub successful: usize,
    pub failed: usize,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// HTTP envelope for the commit endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResponse {
    pub results: CommitResults,
}

/// Persistence seam for committing an analyzed workbook.
#[async_trait]
pub trait Committer: Send + Sync {
    /// Apply the analyzed matches. `analysis.matches` is aligned with the
    /// workbook's rows in tab order.
    async fn commit(&self, workbook: &Workbook, analysis: &AnalysisResult) -> CommitResults;
}

/// Commits against the in-process player directory.
pub struct DirectoryCommitter {
    directory: PlayerDirectory,
}

impl DirectoryCommitter {
    pub fn new(directory: PlayerDirectory) -> Self {
        Self { directory }
    }

    fn commit_row(
        &self,
        row: &RawMatchRow,
        report: &crate::report::MatchReport,
    ) -> Result<(), String> {
        let calc = &report.calculation;
        if !calc.can_calculate {
            let reason = calc.reason.as_deref().unwrap_or("cannot calculate points");
            return Err(format!("{}, row {}: {}", row.tab, row.row_number, reason));
        }

        // can_calculate guarantees a winner and both point values
        let winners = match calc.winner_side {
            Some(1) => &row.side1,
            _ => &row.side2,
        };
        let ranking = calc.ranking_points.unwrap_or(0);
        let pickle = calc.pickle_points.unwrap_or(0);

        for player in winners {
            if !self.directory.award_points(&player.passport, ranking, pickle) {
                return Err(format!(
                    "{}, row {}: player '{}' disappeared from the directory",
                    row.tab, row.row_number, player.passport
                ));
            }
        }

        // Conditional update: a birthdate override applies to every player
        // in the row that carries one; blank cells never clear stored values.
        for player in row.players() {
            if let Some(dob) = &player.birthdate_override {
                self.directory.update_birthdate(&player.passport, dob);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Committer for DirectoryCommitter {
    async fn commit(&self, workbook: &Workbook, analysis: &AnalysisResult) -> CommitResults {
        let mut results = CommitResults {
            successful: 0,
            failed: 0,
            errors: Vec::new(),
        };

        let rows = workbook.tabs.iter().flat_map(|t| t.rows.iter());
        for (row, report) in rows.zip(analysis.matches.iter()) {
            match self.commit_row(row, report) {
                Ok(()) => results.successful += 1,
                Err(message) => {
                    results.failed += 1;
                    results.errors.push(message);
                }
            }
        }

        info!(
            "Commit finished: {} successful, {} failed",
            results.successful, results.failed
        );
        results
    }
}
