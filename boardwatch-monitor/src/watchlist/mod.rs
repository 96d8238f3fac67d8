//! Watchlist domain: entries, lifecycle status, and strategy tags.

pub mod reconcile;
pub mod store;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::metrics::MetricsBlock;

/// Hard ceiling on persisted watchlist size.
pub const WATCHLIST_CAP: usize = 50;

/// Marker appended to the reason of a discarded entry so its history stays
/// legible after revival decisions.
pub const REMOVAL_MARKER: &str = " (removed)";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(t: DateTime<Local>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

// ============================================================================
// Entry types
// ============================================================================

/// How an entry got onto the list, driving follow-up style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTag {
    /// Bid aggressively into the seal
    AggressiveBid,
    /// Chase the limit on a surge
    LimitChase,
    /// Hand-picked by the operator
    Manual,
    /// No strong read
    Neutral,
}

impl Default for StrategyTag {
    fn default() -> Self {
        Self::Neutral
    }
}

/// Lifecycle status of a watchlist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Tracked and eligible for reconciliation
    Active,
    /// Dropped by a reconcile pass; kept for revival
    Discarded,
    /// Operator-pinned; immune to discard and replacement
    Manual,
}

impl Default for EntryStatus {
    fn default() -> Self {
        Self::Active
    }
}

/// One tracked security.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEntry {
    pub code: String,
    pub name: String,
    pub score: f64,
    /// Concept / sector label from the annotator, may be empty
    #[serde(default)]
    pub concept: String,
    /// Why this entry is on the list
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub strategy_tag: StrategyTag,
    #[serde(default)]
    pub status: EntryStatus,
    #[serde(default)]
    pub metrics: MetricsBlock,
    pub added_at: String,
    pub updated_at: String,
}

impl WatchEntry {
    pub fn new(code: &str, name: &str, score: f64, now: DateTime<Local>) -> Self {
        let ts = format_timestamp(now);
        Self {
            code: code.to_string(),
            name: name.to_string(),
            score,
            concept: String::new(),
            reason: String::new(),
            strategy_tag: StrategyTag::default(),
            status: EntryStatus::default(),
            metrics: MetricsBlock::default(),
            added_at: ts.clone(),
            updated_at: ts,
        }
    }

    pub fn is_manual(&self) -> bool {
        self.status == EntryStatus::Manual
    }

    pub fn touch(&mut self, now: DateTime<Local>) {
        self.updated_at = format_timestamp(now);
    }

    /// Mark the entry discarded and stamp its reason.
    pub fn discard(&mut self, now: DateTime<Local>) {
        self.status = EntryStatus::Discarded;
        if !self.reason.ends_with(REMOVAL_MARKER) {
            self.reason.push_str(REMOVAL_MARKER);
        }
        self.touch(now);
    }

    /// Bring a discarded entry back and strip the removal marker.
    pub fn revive(&mut self, now: DateTime<Local>) {
        self.status = EntryStatus::Active;
        if let Some(stripped) = self.reason.strip_suffix(REMOVAL_MARKER) {
            self.reason = stripped.to_string();
        }
        self.touch(now);
    }
}
