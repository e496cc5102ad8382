//! Player directory: passport-code lookup, point totals, and the resolver
//! used during analysis.
//!
//! The directory stands in for the external player service. It is loaded
//! once from CSV at startup and held behind `RwLock` so commits can award
//! points at runtime. Each analysis works against a point-in-time snapshot,
//! so a player created mid-analysis never resolves.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::info;

/// Player gender as stored in the directory. Drives the cross-gender
/// doubles bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Parse a spreadsheet or CSV cell. Accepts `M`/`F` and full words,
    /// any case. Returns `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "m" | "male" => Some(Gender::Male),
            "f" | "female" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// One directory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub passport_code: String,
    pub display_name: String,
    pub gender: Option<Gender>,
    pub ranking_points: u32,
    pub pickle_points: u32,
    /// YYYY-MM-DD when known.
    pub date_of_birth: Option<String>,
}

/// A resolved player as reported in the analysis response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPlayer {
    pub passport_code: String,
    pub display_name: String,
    pub gender: Option<Gender>,
    pub current_ranking_points: u32,
}

/// Outcome of a passport-code lookup.
#[derive(Debug, Clone)]
pub enum Resolution {
    Matched(ResolvedPlayer),
    Unmatched,
}

impl Resolution {
    pub fn is_matched(&self) -> bool {
        matches!(self, Resolution::Matched(_))
    }
}

/// Passport codes are short uppercase alphanumerics (e.g. `CBSPZV`).
/// Malformed codes still go through resolution (and come back unmatched)
/// but get a shape warning in the report.
pub fn is_plausible_passport(code: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]{4,10}$").unwrap());
    re.is_match(code)
}

/// In-memory player directory, backed by `RwLock` for commit-time awards.
#[derive(Debug, Clone, Default)]
pub struct PlayerDirectory {
    inner: Arc<RwLock<HashMap<String, Player>>>,
}

impl PlayerDirectory {
    /// Load the directory from a CSV file with columns
    /// `passport_code,display_name,gender,ranking_points,pickle_points,date_of_birth`.
    pub fn load_from_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .with_context(|| format!("Failed to open player directory: {:?}", path))?;

        let mut players = HashMap::new();
        for (idx, result) in reader.deserialize::<DirectoryRecord>().enumerate() {
            let record =
                result.with_context(|| format!("Bad directory record at line {}", idx + 2))?;
            let player = Player {
                passport_code: record.passport_code.trim().to_string(),
                display_name: record.display_name.trim().to_string(),
                gender: record.gender.as_deref().and_then(Gender::parse),
                ranking_points: record.ranking_points.unwrap_or(0),
                pickle_points: record.pickle_points.unwrap_or(0),
                date_of_birth: record
                    .date_of_birth
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty()),
            };
            players.insert(player.passport_code.clone(), player);
        }

        info!("Loaded {} players from {:?}", players.len(), path);
        Ok(Self {
            inner: Arc::new(RwLock::new(players)),
        })
    }

    pub fn from_players(players: Vec<Player>) -> Self {
        let map = players
            .into_iter()
            .map(|p| (p.passport_code.clone(), p))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// Point-in-time copy used for one analysis.
    pub fn snapshot(&self) -> DirectorySnapshot {
        DirectorySnapshot {
            players: self.inner.read().unwrap().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    /// Add ranking and pickle points to a player. Returns false when the
    /// passport code is unknown.
    pub fn award_points(&self, passport: &str, ranking: u32, pickle: u32) -> bool {
        let mut players = self.inner.write().unwrap();
        match players.get_mut(passport) {
            Some(player) => {
                player.ranking_points += ranking;
                player.pickle_points += pickle;
                true
            }
            None => false,
        }
    }

    /// Set a player's date of birth. Callers only invoke this when the
    /// spreadsheet carried an override value; a blank cell never clears
    /// the stored date.
    pub fn update_birthdate(&self, passport: &str, date_of_birth: &str) -> bool {
        let mut players = self.inner.write().unwrap();
        match players.get_mut(passport) {
            Some(player) => {
                player.date_of_birth = Some(date_of_birth.to_string());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, passport: &str) -> Option<Player> {
        self.inner.read().unwrap().get(passport).cloned()
    }
}

/// Raw CSV record shape; numeric fields tolerate blanks.
#[derive(Debug, Deserialize)]
struct DirectoryRecord {
    passport_code: String,
    display_name: String,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    ranking_points: Option<u32>,
    #[serde(default)]
    pickle_points: Option<u32>,
    #[serde(default)]
    date_of_birth: Option<String>,
}

/// Read-only directory state captured at the start of an analysis.
#[derive(Debug, Clone)]
pub struct DirectorySnapshot {
    players: HashMap<String, Player>,
}

impl DirectorySnapshot {
    /// Exact, case-sensitive lookup.
    pub fn lookup(&self, passport: &str) -> Option<&Player> {
        self.players.get(passport)
    }
}

/// Memoizing resolver for one analysis. Each distinct passport code hits
/// the snapshot once; repeat references reuse the cached resolution, so
/// the matched/unmatched lists stay free of duplicates.
pub struct PlayerResolver<'a> {
    snapshot: &'a DirectorySnapshot,
    cache: HashMap<String, Resolution>,
    /// First-seen order, for stable report output.
    order: Vec<String>,
}

impl<'a> PlayerResolver<'a> {
    pub fn new(snapshot: &'a DirectorySnapshot) -> Self {
        Self {
            snapshot,
            cache: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn resolve(&mut self, passport: &str) -> &Resolution {
        if !self.cache.contains_key(passport) {
            let resolution = match self.snapshot.lookup(passport) {
                Some(player) => Resolution::Matched(ResolvedPlayer {
                    passport_code: player.passport_code.clone(),
                    display_name: player.display_name.clone(),
                    gender: player.gender,
                    current_ranking_points: player.ranking_points,
                }),
                None => Resolution::Unmatched,
            };
            self.cache.insert(passport.to_string(), resolution);
            self.order.push(passport.to_string());
        }
        &self.cache[passport]
    }

    /// Distinct passport codes in first-seen order.
    pub fn seen(&self) -> &[String] {
        &self.order
    }

    pub fn matched(&self) -> Vec<ResolvedPlayer> {
        self.order
            .iter()
            .filter_map(|code| match &self.cache[code] {
                Resolution::Matched(player) => Some(player.clone()),
                Resolution::Unmatched => None,
            })
            .collect()
    }

    pub fn unmatched(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|code| !self.cache[*code].is_matched())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_player(code: &str, gender: Gender, points: u32) -> Player {
        Player {
            passport_code: code.to_string(),
            display_name: format!("Player {}", code),
            gender: Some(gender),
            ranking_points: points,
            pickle_points: 0,
            date_of_birth: None,
        }
    }

    #[test]
    fn test_resolve_matched_and_unmatched() {
        let dir = PlayerDirectory::from_players(vec![sample_player("CBSPZV", Gender::Male, 120)]);
        let snap = dir.snapshot();
        let mut resolver = PlayerResolver::new(&snap);

        assert!(resolver.resolve("CBSPZV").is_matched());
        assert!(!resolver.resolve("ZZZZZZ").is_matched());
        assert_eq!(resolver.matched().len(), 1);
        assert_eq!(resolver.unmatched(), vec!["ZZZZZZ".to_string()]);
    }

    #[test]
    fn test_resolution_is_case_sensitive() {
        let dir = PlayerDirectory::from_players(vec![sample_player("CBSPZV", Gender::Male, 0)]);
        let snap = dir.snapshot();
        let mut resolver = PlayerResolver::new(&snap);
        assert!(!resolver.resolve("cbspzv").is_matched());
    }

    #[test]
    fn test_repeat_resolution_no_duplicates() {
        let dir = PlayerDirectory::from_players(vec![sample_player("AAAAAA", Gender::Female, 50)]);
        let snap = dir.snapshot();
        let mut resolver = PlayerResolver::new(&snap);
        for _ in 0..3 {
            resolver.resolve("AAAAAA");
            resolver.resolve("MISSING1");
        }
        assert_eq!(resolver.matched().len(), 1);
        assert_eq!(resolver.unmatched().len(), 1);
        assert_eq!(resolver.seen().len(), 2);
    }

    #[test]
    fn test_snapshot_isolation() {
        let dir = PlayerDirectory::from_players(vec![sample_player("AAAAAA", Gender::Male, 10)]);
        let snap = dir.snapshot();
        dir.award_points("AAAAAA", 15, 23);

        // The snapshot keeps the pre-award totals
        assert_eq!(snap.lookup("AAAAAA").unwrap().ranking_points, 10);
        assert_eq!(dir.get("AAAAAA").unwrap().ranking_points, 25);
        assert_eq!(dir.get("AAAAAA").unwrap().pickle_points, 23);
    }

    #[test]
    fn test_update_birthdate() {
        let dir = PlayerDirectory::from_players(vec![sample_player("AAAAAA", Gender::Male, 0)]);
        assert!(dir.update_birthdate("AAAAAA", "1990-04-12"));
        assert_eq!(
            dir.get("AAAAAA").unwrap().date_of_birth.as_deref(),
            Some("1990-04-12")
        );
        assert!(!dir.update_birthdate("NOPE12", "2000-01-01"));
    }

    #[test]
    fn test_passport_shape() {
        assert!(is_plausible_passport("CBSPZV"));
        assert!(is_plausible_passport("A1B2"));
        assert!(!is_plausible_passport("abc"));
        assert!(!is_plausible_passport("TOOLONGCODE1"));
        assert!(!is_plausible_passport("AB-CD1"));
    }
}
