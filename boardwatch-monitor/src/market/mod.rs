//! Market domain types: board classification, snapshots, and limit states.
//!
//! A-share securities carry a daily price-move limit whose ratio depends on
//! the exchange segment (board). The classifier in this module maps a live
//! snapshot onto a limit state using the board's ratio and a fixed 0.01
//! rounding tolerance.

pub mod breadth;
pub mod calendar;

use serde::{Deserialize, Serialize};

/// Rounding tolerance applied to all limit-price comparisons.
///
/// Absorbs the rounding noise of `prev_close * ratio` being quoted at
/// 2 decimals.
pub const PRICE_TOLERANCE: f64 = 0.01;

/// Round to 2 decimals (price quoting precision).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// Board Type
// ============================================================================

/// Exchange segment, determining the daily move-limit ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardType {
    /// Shanghai/Shenzhen main board, 10% daily limit
    MainBoard,
    /// ChiNext (30xxxx) and STAR (68xxxx), 20% daily limit
    GrowthOrInnovation,
    /// Beijing Stock Exchange (4x/8x/92x), 30% daily limit
    RegionalExchange,
}

impl BoardType {
    /// Derive the board from a security code (prefixed or bare).
    pub fn from_code(code: &str) -> Self {
        let raw = strip_prefix(code);
        if raw.starts_with("30") || raw.starts_with("68") {
            Self::GrowthOrInnovation
        } else if raw.starts_with('4') || raw.starts_with('8') || raw.starts_with("92") {
            Self::RegionalExchange
        } else {
            Self::MainBoard
        }
    }

    /// Daily limit-up multiplier applied to the previous close.
    pub const fn limit_ratio(self) -> f64 {
        match self {
            Self::MainBoard => 1.1,
            Self::GrowthOrInnovation => 1.2,
            Self::RegionalExchange => 1.3,
        }
    }

    /// Tolerant close-ratio threshold used by the historical metrics engine.
    ///
    /// Deliberately below the exact multiplier so that a sealed close passes
    /// despite 2-decimal price rounding.
    pub const fn metrics_threshold(self) -> f64 {
        match self {
            Self::GrowthOrInnovation => 1.195,
            _ => 1.095,
        }
    }

    /// Change-percent threshold equivalent of [`Self::metrics_threshold`].
    pub fn limit_change_percent(self) -> f64 {
        (self.metrics_threshold() - 1.0) * 100.0
    }
}

/// Compute the limit-up price for a previous close on a given board.
pub fn limit_price(prev_close: f64, board: BoardType) -> f64 {
    round2(prev_close * board.limit_ratio())
}

// ============================================================================
// Code Normalization
// ============================================================================

/// Strip an exchange prefix (sh/sz/bj) from a code.
pub fn strip_prefix(code: &str) -> &str {
    code.strip_prefix("sh")
        .or_else(|| code.strip_prefix("sz"))
        .or_else(|| code.strip_prefix("bj"))
        .unwrap_or(code)
}

/// Normalize a security code to the exchange-qualified `shXXXXXX` form.
///
/// Accepts already-prefixed codes and bare 6-digit codes (prefix inferred
/// from the leading digit). Returns `None` for anything that does not
/// normalize to a valid 6-digit A-share identifier.
pub fn normalize_code(code: &str) -> Option<String> {
    let code = code.trim().to_lowercase();

    let (prefix, raw) = if let Some(parts) = code
        .strip_prefix("sh")
        .map(|r| ("sh", r))
        .or_else(|| code.strip_prefix("sz").map(|r| ("sz", r)))
        .or_else(|| code.strip_prefix("bj").map(|r| ("bj", r)))
    {
        parts
    } else {
        let prefix = match code.chars().next()? {
            '6' => "sh",
            '0' | '3' => "sz",
            '4' | '8' | '9' => "bj",
            _ => return None,
        };
        (prefix, code.as_str())
    };

    if raw.len() != 6 || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    Some(format!("{}{}", prefix, raw))
}

// ============================================================================
// Security Snapshot
// ============================================================================

/// One security's live quote, normalized from vendor payloads.
///
/// Produced fresh each scan and superseded by the next one; no history is
/// retained here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySnapshot {
    /// Exchange-qualified code, e.g. "sh600519"
    pub code: String,
    /// Security name
    pub name: String,
    /// Latest traded price
    pub current: f64,
    /// Previous session close
    pub prev_close: f64,
    /// Session open
    pub open: f64,
    /// Session high
    pub high: f64,
    /// Session low
    pub low: f64,
    /// Change percent vs previous close
    pub change_percent: f64,
    /// Turnover ratio (percent), zero if the vendor does not supply it
    pub turnover: f64,
    /// Free-float market value, zero if not supplied
    pub circulation_value: f64,
    /// Best-ask volume when microstructure data is available.
    /// `None` means the vendor does not expose order-book depth.
    pub ask1_volume: Option<f64>,
}

impl SecuritySnapshot {
    /// Board segment for this security.
    pub fn board(&self) -> BoardType {
        BoardType::from_code(&self.code)
    }

    /// Limit-up price for today's session.
    pub fn limit_price(&self) -> f64 {
        limit_price(self.prev_close, self.board())
    }
}

/// One index quote (benchmark, traded value).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexQuote {
    /// Index code, e.g. "sh000001"
    pub code: String,
    /// Index name
    pub name: String,
    /// Latest value
    pub current: f64,
    /// Change percent vs previous close
    pub change_percent: f64,
    /// Traded value in hundreds of millions (亿)
    pub amount: f64,
}

// ============================================================================
// Limit State
// ============================================================================

/// Limit state of a security at observation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitState {
    /// Not at or near the limit (or classification undefined)
    None,
    /// At the limit price but with visible ask-side supply (not sealed)
    Attempt,
    /// At the limit with no ask-side supply (or no microstructure data)
    Sealed,
    /// Touched the limit intraday but retreated below it
    Broken,
}

/// Classify a snapshot against its board's limit price.
///
/// A zero or negative previous close (suspension, new listing) makes the
/// classification undefined and returns [`LimitState::None`]. The ask-side
/// liquidity refinement only applies when the vendor supplied depth data;
/// price alone decides otherwise.
pub fn classify(snapshot: &SecuritySnapshot, board: BoardType) -> LimitState {
    if snapshot.prev_close <= 0.0 {
        return LimitState::None;
    }

    let limit = limit_price(snapshot.prev_close, board);

    if snapshot.current >= limit - PRICE_TOLERANCE {
        // At the limit. Sealed unless visible sell-side supply remains.
        match snapshot.ask1_volume {
            Some(vol) if vol > 0.0 => LimitState::Attempt,
            _ => LimitState::Sealed,
        }
    } else if snapshot.high >= limit - PRICE_TOLERANCE {
        LimitState::Broken
    } else {
        LimitState::None
    }
}

// ============================================================================
// Tests
// ============================================================================
