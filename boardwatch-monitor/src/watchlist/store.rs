//! JSON persistence for the watchlist, the day's pools, and the analysis
//! cache. All files live under the data directory next to `config.json`.
//!
//! Persistence failures are logged and tolerated; the in-memory state
//! stays authoritative.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, Timelike};
use serde::{Deserialize, Serialize};
use tracing::warn;

use boardwatch_common::{Error, Result};

use crate::scan::MarketPools;

use super::{WatchEntry, WATCHLIST_CAP};

const WATCHLIST_FILE: &str = "watchlist.json";
const POOLS_FILE: &str = "market_pools.json";
const ANALYSIS_CACHE_FILE: &str = "analysis_cache.json";

/// One cached per-security analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAnalysis {
    pub content: String,
    /// "YYYY-MM-DD HH:MM:SS"
    pub timestamp: String,
}

impl CachedAnalysis {
    /// Whether the entry is still usable at `now`.
    ///
    /// Entries expire at the day boundary, and additionally at the 15:00
    /// close: an intraday analysis is stale once the session has settled.
    pub fn is_fresh(&self, now: DateTime<Local>) -> bool {
        let Ok(at) = chrono::NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%d %H:%M:%S")
        else {
            return false;
        };
        if at.date() != now.date_naive() {
            return false;
        }
        !(at.hour() < 15 && now.hour() >= 15)
    }
}

pub struct WatchlistStore {
    dir: PathBuf,
}

impl WatchlistStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Store rooted at the default data directory.
    pub fn at_data_dir() -> Self {
        Self::new(boardwatch_common::config::data_dir())
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn watchlist_path(&self) -> PathBuf {
        self.path(WATCHLIST_FILE)
    }

    /// Age of the persisted watchlist, if one exists.
    pub fn watchlist_age(&self) -> Option<std::time::Duration> {
        let meta = fs::metadata(self.watchlist_path()).ok()?;
        let mtime = meta.modified().ok()?;
        SystemTime::now().duration_since(mtime).ok()
    }

    // ========================================================================
    // Watchlist
    // ========================================================================

    pub fn load_watchlist(&self) -> Vec<WatchEntry> {
        load_json(&self.watchlist_path()).unwrap_or_default()
    }

    /// Persist the watchlist: newest-touched entries win the cap, output
    /// sorted by score descending.
    pub fn save_watchlist(&self, entries: &[WatchEntry]) -> Result<()> {
        let mut entries = entries.to_vec();
        if entries.len() > WATCHLIST_CAP {
            entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            entries.truncate(WATCHLIST_CAP);
        }
        entries.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        save_json(&self.dir, &self.watchlist_path(), &entries)
    }

    // ========================================================================
    // Pools
    // ========================================================================

    pub fn load_pools(&self) -> MarketPools {
        load_json(&self.path(POOLS_FILE)).unwrap_or_default()
    }

    pub fn save_pools(&self, pools: &MarketPools) -> Result<()> {
        save_json(&self.dir, &self.path(POOLS_FILE), pools)
    }

    // ========================================================================
    // Analysis cache
    // ========================================================================

    pub fn load_analysis_cache(&self) -> HashMap<String, CachedAnalysis> {
        load_json(&self.path(ANALYSIS_CACHE_FILE)).unwrap_or_default()
    }

    pub fn save_analysis_cache(&self, cache: &HashMap<String, CachedAnalysis>) -> Result<()> {
        save_json(&self.dir, &self.path(ANALYSIS_CACHE_FILE), cache)
    }
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let text = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring corrupt document");
            None
        }
    }
}

fn save_json<T: Serialize>(dir: &Path, path: &Path, value: &T) -> Result<()> {
    fs::create_dir_all(dir)?;
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Internal(format!("serialize {}: {}", path.display(), e)))?;
    fs::write(path, text)?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
