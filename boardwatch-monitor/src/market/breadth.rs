//! Market breadth aggregation and sentiment derivation.
//!
//! Breadth counters are recomputed on demand from the latest universe
//! snapshot; the sentiment rule table is evaluated strictly in priority
//! order so the panic rule wins over everything else.

use serde::{Deserialize, Serialize};

use super::{BoardType, IndexQuote, LimitState, SecuritySnapshot};

/// Change-percent threshold below which a security counts as limit-down.
/// Main-board oriented; a deliberate simplification on 20/30cm boards.
const LIMIT_DOWN_CHANGE: f64 = -9.5;

/// Benchmark drop that qualifies as a panic signal (percent).
const PANIC_INDEX_DROP: f64 = -1.5;
/// Combined turnover (亿) above which a deep drop counts as panic selling.
const PANIC_TURNOVER: f64 = 10_000.0;

// ============================================================================
// Breadth
// ============================================================================

/// Aggregate counters over one universe snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreadthStats {
    /// Securities currently sealed at the limit
    pub limit_up_count: usize,
    /// Securities that touched the limit but retreated
    pub broken_count: usize,
    /// Securities at or below the limit-down threshold
    pub limit_down_count: usize,
    /// Advancing securities
    pub up_count: usize,
    /// Declining securities
    pub down_count: usize,
    /// Unchanged securities
    pub flat_count: usize,
}

impl BreadthStats {
    /// Seal ratio across today's limit-up attempts, percent.
    pub fn seal_ratio(&self) -> f64 {
        let attempts = self.limit_up_count + self.broken_count;
        if attempts == 0 {
            return 0.0;
        }
        self.limit_up_count as f64 / attempts as f64 * 100.0
    }
}

/// Compute breadth counters from a classified universe snapshot.
pub fn compute_breadth(universe: &[SecuritySnapshot]) -> BreadthStats {
    let mut stats = BreadthStats::default();

    for snap in universe {
        let board = BoardType::from_code(&snap.code);
        match super::classify(snap, board) {
            LimitState::Sealed => stats.limit_up_count += 1,
            LimitState::Broken => stats.broken_count += 1,
            _ => {}
        }
        if snap.change_percent < LIMIT_DOWN_CHANGE {
            stats.limit_down_count += 1;
        }
        if snap.change_percent > 0.0 {
            stats.up_count += 1;
        } else if snap.change_percent < 0.0 {
            stats.down_count += 1;
        } else {
            stats.flat_count += 1;
        }
    }

    stats
}

/// Combined traded value (亿) over every served index quote.
pub fn total_amount(indices: &[IndexQuote]) -> f64 {
    indices.iter().map(|q| q.amount).sum()
}

// ============================================================================
// Sentiment
// ============================================================================

/// Market mood bucket derived from breadth and the benchmark index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Panic,
    High,
    Low,
    Neutral,
}

impl Sentiment {
    /// Position-sizing suggestion paired with the mood bucket.
    pub fn suggestion(self) -> &'static str {
        match self {
            Self::Panic => "de-risk and wait for stabilization",
            Self::High => "aggressive participation in leading names",
            Self::Low => "cautious, small probing positions only",
            Self::Neutral => "rotate into strength selectively",
        }
    }
}

/// One-line aggregate view of the session, served to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOverview {
    pub indices: Vec<IndexQuote>,
    pub stats: BreadthStats,
    /// Combined traded value over the served indices, 亿
    pub total_amount: f64,
    pub sentiment: Sentiment,
    pub suggestion: String,
}

/// Derive the sentiment bucket from breadth, the Shanghai benchmark, and
/// the combined traded value.
///
/// Rules are evaluated in fixed priority order; the first match wins.
/// A missing benchmark quote disables the rules that read it.
pub fn derive_sentiment(
    stats: &BreadthStats,
    benchmark: Option<&IndexQuote>,
    total_amount: f64,
) -> Sentiment {
    let bench_change = benchmark.map(|b| b.change_percent);

    // Panic: benchmark down hard on heavy combined turnover.
    if let Some(change) = bench_change {
        if change < PANIC_INDEX_DROP && total_amount > PANIC_TURNOVER {
            return Sentiment::Panic;
        }
    }

    // High: broad limit-up participation without a sagging benchmark.
    if stats.limit_up_count > 50 && bench_change.map_or(true, |c| c > -0.5) {
        return Sentiment::High;
    }

    // Low: thin participation or a clearly weak benchmark.
    if stats.limit_up_count < 20 || bench_change.map_or(false, |c| c < -1.0) {
        return Sentiment::Low;
    }

    Sentiment::Neutral
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bench(change: f64, amount: f64) -> IndexQuote {
        IndexQuote {
            code: "sh000001".to_string(),
            name: "SSE Composite".to_string(),
            current: 3200.0,
            change_percent: change,
            amount,
        }
    }

    fn stats(limit_up: usize, broken: usize) -> BreadthStats {
        BreadthStats {
            limit_up_count: limit_up,
            broken_count: broken,
            ..Default::default()
        }
    }

    #[test]
    fn test_panic_beats_high() {
        // 80 limit-ups would be High, but a deep drop on heavy turnover
        // takes priority.
        let s = stats(80, 5);
        let b = bench(-2.0, 7_000.0);
        assert_eq!(derive_sentiment(&s, Some(&b), 12_000.0), Sentiment::Panic);
    }

    #[test]
    fn test_panic_requires_turnover() {
        let s = stats(30, 5);
        let b = bench(-2.0, 4_000.0);
        // Deep drop on light turnover is merely weak
        assert_eq!(derive_sentiment(&s, Some(&b), 8_000.0), Sentiment::Low);
    }

    #[test]
    fn test_high_sentiment() {
        let s = stats(60, 5);
        let b = bench(0.3, 5_000.0);
        assert_eq!(derive_sentiment(&s, Some(&b), 9_000.0), Sentiment::High);
    }

    #[test]
    fn test_high_blocked_by_weak_benchmark() {
        let s = stats(60, 5);
        let b = bench(-0.8, 5_000.0);
        // Benchmark below -0.5 blocks High; -0.8 is not below -1.0 and
        // 60 limit-ups is not thin, so Neutral.
        assert_eq!(derive_sentiment(&s, Some(&b), 9_000.0), Sentiment::Neutral);
    }

    #[test]
    fn test_low_on_thin_participation() {
        let s = stats(10, 2);
        let b = bench(0.5, 5_000.0);
        assert_eq!(derive_sentiment(&s, Some(&b), 9_000.0), Sentiment::Low);
    }

    #[test]
    fn test_neutral() {
        let s = stats(30, 5);
        let b = bench(0.2, 5_000.0);
        assert_eq!(derive_sentiment(&s, Some(&b), 9_000.0), Sentiment::Neutral);
    }

    #[test]
    fn test_missing_benchmark_disables_index_rules() {
        let s = stats(60, 5);
        assert_eq!(derive_sentiment(&s, None, 12_000.0), Sentiment::High);
        assert_eq!(derive_sentiment(&stats(10, 0), None, 12_000.0), Sentiment::Low);
    }

    #[test]
    fn test_total_amount_sums_every_index() {
        let indices = vec![bench(-1.0, 5_000.0), IndexQuote {
            code: "sz399001".to_string(),
            name: "SZSE Component".to_string(),
            current: 10_000.0,
            change_percent: -1.2,
            amount: 6_500.0,
        }, IndexQuote {
            code: "sz399006".to_string(),
            name: "ChiNext".to_string(),
            current: 2_000.0,
            change_percent: -1.5,
            amount: 3_000.0,
        }];
        assert_eq!(total_amount(&indices), 14_500.0);
    }

    #[test]
    fn test_breadth_counters() {
        let mk = |code: &str, current: f64, high: f64, prev: f64, chg: f64| SecuritySnapshot {
            code: code.to_string(),
            name: "t".to_string(),
            current,
            prev_close: prev,
            open: prev,
            high,
            low: prev,
            change_percent: chg,
            turnover: 0.0,
            circulation_value: 0.0,
            ask1_volume: None,
        };
        let universe = vec![
            mk("sh600001", 11.0, 11.0, 10.0, 10.0),  // sealed
            mk("sh600002", 10.5, 11.0, 10.0, 5.0),   // broken
            mk("sh600003", 9.0, 10.0, 10.0, -10.0),  // limit down
            mk("sh600004", 10.2, 10.3, 10.0, 2.0),   // up
        ];
        let stats = compute_breadth(&universe);
        assert_eq!(stats.limit_up_count, 1);
        assert_eq!(stats.broken_count, 1);
        assert_eq!(stats.limit_down_count, 1);
        assert_eq!(stats.up_count, 3);
        assert_eq!(stats.down_count, 1);
        assert_eq!(stats.seal_ratio(), 50.0);
    }
}
