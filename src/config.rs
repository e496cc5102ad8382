//! Server configuration and competition multipliers.
//!
//! Everything comes from the environment (`.env` supported via dotenvy).
//! Competition multipliers are loaded from a JSON file mapping tab/category
//! names to points multipliers; tabs not listed use 1.0.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::info;

const DEFAULT_MULTIPLIER: f64 = 1.0;

/// Runtime settings for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub body_limit_bytes: usize,
    pub players_csv: PathBuf,
    /// Optional; when absent every tab gets the default multiplier.
    pub competitions_json: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let max_upload_mb = std::env::var("MAX_UPLOAD_MB")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(25);
        let players_csv = std::env::var("PLAYERS_CSV")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/players.csv"));
        let competitions_json = std::env::var("COMPETITIONS_JSON").ok().map(PathBuf::from);

        Self {
            bind_addr,
            body_limit_bytes: max_upload_mb * 1024 * 1024,
            players_csv,
            competitions_json,
        }
    }
}

/// Tab/category name → points multiplier, backed by `RwLock` for runtime
/// updates.
#[derive(Debug, Default)]
pub struct CompetitionStore {
    multipliers: RwLock<HashMap<String, f64>>,
}

impl CompetitionStore {
    /// Store with no configured competitions; every tab multiplies by 1.0.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from a JSON object of `{ "category name": multiplier }`.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read competitions file: {:?}", path))?;
        let multipliers: HashMap<String, f64> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse competitions file: {:?}", path))?;

        info!(
            "Loaded {} competition multipliers from {:?}",
            multipliers.len(),
            path
        );
        Ok(Self {
            multipliers: RwLock::new(multipliers),
        })
    }

    /// Multiplier for a tab, exact name match. Unlisted tabs get 1.0.
    pub fn multiplier_for(&self, tab: &str) -> f64 {
        self.multipliers
            .read()
            .unwrap()
            .get(tab)
            .copied()
            .unwrap_or(DEFAULT_MULTIPLIER)
    }

    pub fn insert(&self, tab: &str, multiplier: f64) {
        self.multipliers
            .write()
            .unwrap()
            .insert(tab.to_string(), multiplier);
    }
}
