//! Historical limit-up metrics computed from daily bars.
//!
//! All ratios compare a bar against the previous close using the board's
//! tolerant threshold (see [`BoardType::metrics_threshold`]), so a sealed
//! close passes despite 2-decimal price rounding. Attempts split into two
//! classes by whether the previous day was itself sealed; the seal and
//! broken rates are first-board statistics.

use serde::{Deserialize, Serialize};

use crate::data::DailyBar;
use crate::market::{round2, BoardType};

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Per-security behavioral metrics over the bar history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsBlock {
    /// Share of first-board attempts that held into the close, percent
    pub seal_rate: f64,
    /// Share of first-board attempts that failed into the close, percent
    pub broken_rate: f64,
    /// Mean next-day open premium over sealed closes, percent
    pub next_day_premium: f64,
    /// Consecutive sealed closes ending at the latest bar
    pub limit_up_streak: u32,
}

/// Compute the metrics block for one security's bar history.
///
/// Bars must be oldest first. Fewer than two bars leaves every metric at
/// zero since no day-over-day ratio exists.
pub fn compute_metrics(bars: &[DailyBar], board: BoardType) -> MetricsBlock {
    if bars.len() < 2 {
        return MetricsBlock::default();
    }

    let threshold = board.metrics_threshold();

    let mut first_board_attempts = 0u32;
    let mut first_board_sealed = 0u32;
    let mut premium_sum = 0.0;
    let mut premium_n = 0u32;

    for i in 1..bars.len() {
        let prev_close = bars[i - 1].close;
        if prev_close <= 0.0 {
            continue;
        }
        let touched = bars[i].high / prev_close >= threshold;
        let held = bars[i].close / prev_close >= threshold;
        if !(touched || held) {
            continue;
        }

        // A promotion day (the previous close was itself sealed) is its
        // own attempt class; the exposed rates read the first-board
        // class only, so a failed promotion never dents a clean
        // first-board record.
        let promotion = i > 1
            && bars[i - 2].close > 0.0
            && prev_close / bars[i - 2].close >= threshold;
        if !promotion {
            first_board_attempts += 1;
            if held {
                first_board_sealed += 1;
            }
        }

        if held {
            if let Some(next) = bars.get(i + 1) {
                premium_sum += (next.open - bars[i].close) / bars[i].close * 100.0;
                premium_n += 1;
            }
        }
    }

    let (seal_rate, broken_rate) = if first_board_attempts > 0 {
        let failures = first_board_attempts - first_board_sealed;
        (
            round1(first_board_sealed as f64 / first_board_attempts as f64 * 100.0),
            round1(failures as f64 / first_board_attempts as f64 * 100.0),
        )
    } else {
        (0.0, 0.0)
    };

    let next_day_premium = if premium_n > 0 {
        round2(premium_sum / premium_n as f64)
    } else {
        0.0
    };

    // Streak counts backward from the latest bar while each close held
    // the limit against its predecessor.
    let mut streak = 0u32;
    for i in (1..bars.len()).rev() {
        let prev_close = bars[i - 1].close;
        if prev_close > 0.0 && bars[i].close / prev_close >= threshold {
            streak += 1;
        } else {
            break;
        }
    }

    MetricsBlock {
        seal_rate,
        broken_rate,
        next_day_premium,
        limit_up_streak: streak,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, open: f64, high: f64, close: f64) -> DailyBar {
        DailyBar {
            date: date.to_string(),
            open,
            high,
            low: open.min(close),
            close,
        }
    }

    #[test]
    fn test_empty_and_single_bar_yield_zeros() {
        assert_eq!(compute_metrics(&[], BoardType::MainBoard), MetricsBlock::default());
        let one = vec![bar("2025-06-02", 10.0, 11.0, 11.0)];
        assert_eq!(compute_metrics(&one, BoardType::MainBoard), MetricsBlock::default());
    }

    #[test]
    fn test_sealed_day_counts() {
        // 10.00 -> 11.00 close is a sealed main-board day
        let bars = vec![
            bar("2025-06-02", 10.0, 10.0, 10.0),
            bar("2025-06-03", 10.2, 11.0, 11.0),
        ];
        let m = compute_metrics(&bars, BoardType::MainBoard);
        assert_eq!(m.seal_rate, 100.0);
        assert_eq!(m.broken_rate, 0.0);
        assert_eq!(m.limit_up_streak, 1);
        // No next bar after the sealed day, so no premium sample
        assert_eq!(m.next_day_premium, 0.0);
    }

    #[test]
    fn test_broken_day_counts() {
        // Touched 11.00 intraday but closed at 10.50
        let bars = vec![
            bar("2025-06-02", 10.0, 10.0, 10.0),
            bar("2025-06-03", 10.2, 11.0, 10.5),
        ];
        let m = compute_metrics(&bars, BoardType::MainBoard);
        assert_eq!(m.seal_rate, 0.0);
        assert_eq!(m.broken_rate, 100.0);
        assert_eq!(m.limit_up_streak, 0);
    }

    #[test]
    fn test_next_day_premium() {
        // Sealed at 11.00, next day opens 11.44: +4% premium
        let bars = vec![
            bar("2025-06-02", 10.0, 10.0, 10.0),
            bar("2025-06-03", 10.2, 11.0, 11.0),
            bar("2025-06-04", 11.44, 11.6, 11.2),
        ];
        let m = compute_metrics(&bars, BoardType::MainBoard);
        assert_eq!(m.next_day_premium, 4.0);
    }

    #[test]
    fn test_streak_resets_on_gap() {
        // Sealed, sealed, flat, sealed, sealed: streak is the trailing 2
        let bars = vec![
            bar("2025-05-26", 10.0, 10.0, 10.0),
            bar("2025-05-27", 10.5, 11.0, 11.0),
            bar("2025-05-28", 11.5, 12.1, 12.1),
            bar("2025-05-29", 12.0, 12.3, 12.1),
            bar("2025-05-30", 12.5, 13.31, 13.31),
            bar("2025-06-02", 13.5, 14.64, 14.64),
        ];
        let m = compute_metrics(&bars, BoardType::MainBoard);
        assert_eq!(m.limit_up_streak, 2);
    }

    #[test]
    fn test_growth_board_threshold() {
        // +10% close does not count on a 20% board
        let bars = vec![
            bar("2025-06-02", 10.0, 10.0, 10.0),
            bar("2025-06-03", 10.5, 11.0, 11.0),
        ];
        let m = compute_metrics(&bars, BoardType::GrowthOrInnovation);
        assert_eq!(m.seal_rate, 0.0);
        assert_eq!(m.limit_up_streak, 0);

        // +20% does
        let bars = vec![
            bar("2025-06-02", 10.0, 10.0, 10.0),
            bar("2025-06-03", 10.5, 12.0, 12.0),
        ];
        let m = compute_metrics(&bars, BoardType::GrowthOrInnovation);
        assert_eq!(m.seal_rate, 100.0);
        assert_eq!(m.limit_up_streak, 1);
    }

    #[test]
    fn test_failed_promotion_leaves_first_board_rates_intact() {
        // A first-board seal followed by a broken promotion: the exposed
        // rates read the first-board class, which stayed clean.
        let bars = vec![
            bar("2025-06-02", 10.0, 10.0, 10.0),
            bar("2025-06-03", 10.2, 11.0, 11.0), // first-board sealed
            bar("2025-06-04", 11.2, 12.1, 11.3), // touched 2nd board, fell back
        ];
        let m = compute_metrics(&bars, BoardType::MainBoard);
        assert_eq!(m.seal_rate, 100.0);
        assert_eq!(m.broken_rate, 0.0);
        assert_eq!(m.limit_up_streak, 0);
    }

    #[test]
    fn test_mixed_history_rates_round_to_one_decimal() {
        // Three first-board attempts, two sealed: seal 66.7, broken 33.3.
        // Quiet days between attempts keep every attempt first-board.
        let bars = vec![
            bar("2025-05-26", 10.0, 10.0, 10.0),
            bar("2025-05-27", 10.2, 11.0, 11.0),   // sealed
            bar("2025-05-28", 11.1, 11.3, 11.2),   // quiet
            bar("2025-05-29", 11.3, 12.3, 11.5),   // broken
            bar("2025-05-30", 11.6, 11.8, 11.5),   // quiet
            bar("2025-06-02", 11.8, 12.63, 12.63), // sealed
        ];
        let m = compute_metrics(&bars, BoardType::MainBoard);
        assert_eq!(m.seal_rate, 66.7);
        assert_eq!(m.broken_rate, 33.3);
        assert_eq!(m.limit_up_streak, 1);
    }
}
