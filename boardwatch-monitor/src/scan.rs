//! Universe scanning: limit-up/broken pools and intraday surge candidates.
//!
//! Pools are derived from classified universe snapshots; ST-flagged names
//! and malformed codes are excluded everywhere.

use serde::{Deserialize, Serialize};

use crate::market::{classify, BoardType, LimitState, SecuritySnapshot};
use crate::metrics::MetricsBlock;
use crate::watchlist::StrategyTag;

/// Change-percent threshold for an intraday surge on a 10% board.
const SURGE_MAIN: f64 = 5.0;
/// Change-percent threshold for an intraday surge on a 20/30% board.
const SURGE_WIDE: f64 = 10.0;
/// Flat score assigned to intraday surge candidates.
const SURGE_SCORE: f64 = 8.0;

/// Provenance marker carried in the reason of scanner-promoted entries.
/// The reconciler keys its discard scope on it.
pub const INTRADAY_REASON: &str = "intraday surge";

// ============================================================================
// Pool types
// ============================================================================

/// One member of the limit-up or broken pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEntry {
    pub code: String,
    pub name: String,
    pub current: f64,
    pub change_percent: f64,
    pub turnover: f64,
    /// Seal timestamp when known; "-" for snapshot-derived entries
    pub seal_time: String,
    /// How the entry got pooled
    pub reason: String,
    /// Historical metrics, filled in by the refresh loop
    #[serde(default)]
    pub metrics: MetricsBlock,
}

/// The day's limit pools, refreshed together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketPools {
    pub limit_up: Vec<PoolEntry>,
    pub broken: Vec<PoolEntry>,
}

impl MarketPools {
    /// Add a sealed entry unless the code is already pooled.
    pub fn merge_limit_up(&mut self, entry: PoolEntry) {
        if !self.limit_up.iter().any(|e| e.code == entry.code) {
            self.limit_up.push(entry);
        }
    }

    /// Fold a seal staged between refreshes into the limit-up pool. A code
    /// the fresh derivation already classified, in either pool, wins over
    /// the staged observation.
    pub fn absorb_seal(&mut self, entry: PoolEntry) {
        if self.broken.iter().any(|e| e.code == entry.code) {
            return;
        }
        self.merge_limit_up(entry);
    }

    /// Carry metric blocks over from the previous pool generation so a
    /// refresh does not blank them while new ones are computed.
    pub fn inherit_metrics(&mut self, previous: &MarketPools) {
        let prior: std::collections::HashMap<&str, &MetricsBlock> = previous
            .limit_up
            .iter()
            .chain(previous.broken.iter())
            .map(|e| (e.code.as_str(), &e.metrics))
            .collect();
        for entry in self.limit_up.iter_mut().chain(self.broken.iter_mut()) {
            if let Some(block) = prior.get(entry.code.as_str()) {
                entry.metrics = (*block).clone();
            }
        }
    }
}

/// One intraday surge candidate, staged for watchlist merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntradayCandidate {
    pub code: String,
    pub name: String,
    pub current: f64,
    pub change_percent: f64,
    pub score: f64,
    pub strategy_tag: StrategyTag,
}

// ============================================================================
// Scanning
// ============================================================================

/// Whether a snapshot is eligible for pooling at all.
fn tradeable(snap: &SecuritySnapshot) -> bool {
    let raw = crate::market::strip_prefix(&snap.code);
    raw.len() == 6 && raw.chars().all(|c| c.is_ascii_digit()) && !snap.name.contains("ST")
}

fn pool_entry(snap: &SecuritySnapshot, reason: &str) -> PoolEntry {
    PoolEntry {
        code: snap.code.clone(),
        name: snap.name.clone(),
        current: snap.current,
        change_percent: snap.change_percent,
        turnover: snap.turnover,
        seal_time: "-".to_string(),
        reason: reason.to_string(),
        metrics: MetricsBlock::default(),
    }
}

/// Classify the universe into limit pools.
pub fn derive_pools(universe: &[SecuritySnapshot]) -> MarketPools {
    let mut pools = MarketPools::default();
    for snap in universe.iter().filter(|s| tradeable(s)) {
        match classify(snap, BoardType::from_code(&snap.code)) {
            LimitState::Sealed => pools.limit_up.push(pool_entry(snap, "sealed at the limit")),
            LimitState::Attempt => pools
                .limit_up
                .push(pool_entry(snap, "at the limit, ask supply visible")),
            LimitState::Broken => pools.broken.push(pool_entry(snap, "broke the seal")),
            LimitState::None => {}
        }
    }
    pools
}

/// Pick intraday surge candidates from the universe: strong advances that
/// have not yet reached the limit.
pub fn scan_intraday(universe: &[SecuritySnapshot]) -> Vec<IntradayCandidate> {
    let mut out = Vec::new();
    for snap in universe.iter().filter(|s| tradeable(s)) {
        let board = BoardType::from_code(&snap.code);
        let threshold = match board {
            BoardType::MainBoard => SURGE_MAIN,
            _ => SURGE_WIDE,
        };
        if snap.change_percent < threshold {
            continue;
        }
        if classify(snap, board) != LimitState::None {
            continue;
        }
        out.push(IntradayCandidate {
            code: snap.code.clone(),
            name: snap.name.clone(),
            current: snap.current,
            change_percent: snap.change_percent,
            score: SURGE_SCORE,
            strategy_tag: StrategyTag::LimitChase,
        });
    }
    out.sort_by(|a, b| {
        b.change_percent
            .partial_cmp(&a.change_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(code: &str, name: &str, current: f64, high: f64, prev: f64) -> SecuritySnapshot {
        SecuritySnapshot {
            code: code.to_string(),
            name: name.to_string(),
            current,
            prev_close: prev,
            open: prev,
            high,
            low: prev,
            change_percent: if prev > 0.0 {
                crate::market::round2((current - prev) / prev * 100.0)
            } else {
                0.0
            },
            turnover: 1.0,
            circulation_value: 0.0,
            ask1_volume: None,
        }
    }

    #[test]
    fn test_derive_pools() {
        let universe = vec![
            snap("sh600001", "甲", 11.0, 11.0, 10.0),  // sealed
            snap("sh600002", "乙", 10.5, 11.0, 10.0),  // broken
            snap("sh600003", "丙", 10.2, 10.3, 10.0),  // neither
            snap("sh600004", "ST丁", 11.0, 11.0, 10.0), // ST excluded
        ];
        let pools = derive_pools(&universe);
        assert_eq!(pools.limit_up.len(), 1);
        assert_eq!(pools.limit_up[0].code, "sh600001");
        assert_eq!(pools.limit_up[0].seal_time, "-");
        assert_eq!(pools.limit_up[0].reason, "sealed at the limit");
        assert_eq!(pools.broken.len(), 1);
        assert_eq!(pools.broken[0].code, "sh600002");
    }

    #[test]
    fn test_merge_limit_up_dedupes() {
        let mut pools = derive_pools(&[snap("sh600001", "甲", 11.0, 11.0, 10.0)]);
        pools.merge_limit_up(pool_entry(&snap("sh600001", "甲", 11.0, 11.0, 10.0), "sealed"));
        assert_eq!(pools.limit_up.len(), 1);
        pools.merge_limit_up(pool_entry(&snap("sh600005", "戊", 11.0, 11.0, 10.0), "sealed"));
        assert_eq!(pools.limit_up.len(), 2);
    }

    #[test]
    fn test_absorb_seal_defers_to_fresh_classification() {
        // sh600002 retreated and the fresh derivation already holds it in
        // the broken pool; a stale staged seal must not resurrect it.
        let mut pools = derive_pools(&[
            snap("sh600001", "甲", 11.0, 11.0, 10.0),
            snap("sh600002", "乙", 10.5, 11.0, 10.0),
        ]);
        pools.absorb_seal(pool_entry(&snap("sh600002", "乙", 11.0, 11.0, 10.0), "sealed"));
        assert_eq!(pools.limit_up.len(), 1);
        assert_eq!(pools.broken.len(), 1);

        // A seal the refresh has not seen yet is folded in.
        pools.absorb_seal(pool_entry(&snap("sh600005", "戊", 11.0, 11.0, 10.0), "sealed"));
        assert_eq!(pools.limit_up.len(), 2);
    }

    #[test]
    fn test_inherit_metrics_by_code() {
        let mut previous = derive_pools(&[snap("sh600001", "甲", 11.0, 11.0, 10.0)]);
        previous.limit_up[0].metrics.seal_rate = 75.0;

        let mut fresh = derive_pools(&[
            snap("sh600001", "甲", 11.0, 11.0, 10.0),
            snap("sh600005", "戊", 11.0, 11.0, 10.0),
        ]);
        fresh.inherit_metrics(&previous);
        assert_eq!(fresh.limit_up[0].metrics.seal_rate, 75.0);
        assert_eq!(fresh.limit_up[1].metrics.seal_rate, 0.0);
    }

    #[test]
    fn test_scan_intraday_thresholds() {
        let universe = vec![
            snap("sh600001", "甲", 10.6, 10.6, 10.0), // +6% main board: candidate
            snap("sh600002", "乙", 10.4, 10.4, 10.0), // +4%: below threshold
            snap("sz300001", "丙", 10.6, 10.6, 10.0), // +6% on 20% board: below
            snap("sz300002", "丁", 11.2, 11.2, 10.0), // +12% on 20% board: candidate
        ];
        let cands = scan_intraday(&universe);
        let codes: Vec<&str> = cands.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["sz300002", "sh600001"]);
        assert_eq!(cands[0].score, 8.0);
        assert_eq!(cands[0].strategy_tag, StrategyTag::LimitChase);
    }

    #[test]
    fn test_scan_intraday_excludes_limit_states() {
        // Already sealed and already broken names are pool material, not
        // surge candidates.
        let universe = vec![
            snap("sh600001", "甲", 11.0, 11.0, 10.0),
            snap("sh600002", "乙", 10.6, 11.0, 10.0),
        ];
        assert!(scan_intraday(&universe).is_empty());
    }

    #[test]
    fn test_st_names_excluded() {
        let universe = vec![
            snap("sh600001", "ST甲", 10.6, 10.6, 10.0),
            snap("sh600002", "*ST乙", 10.6, 10.6, 10.0),
        ];
        assert!(scan_intraday(&universe).is_empty());
    }
}
