//! Daily-bar history: vendor fetch plus an in-process TTL cache.
//!
//! Bars only change once per session, so a generous TTL keeps the metrics
//! engine from hammering the vendor when the watchlist refreshes.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::source::SourceError;
use super::DailyBar;

const SOURCE_NAME: &str = "sina-history";
const KLINE_URL: &str =
    "https://quotes.sina.cn/cn/api/json_v2.php/CN_MarketDataService.getKLineData";
/// Daily-bar scale (240 minutes).
const DAILY_SCALE: &str = "240";
const DEFAULT_DEPTH: usize = 300;

/// How long a cached bar series stays fresh.
const CACHE_TTL: Duration = Duration::from_secs(30 * 60);

// ============================================================================
// Bar source
// ============================================================================

/// Supplier of historical daily bars for one security.
#[async_trait]
pub trait BarSource: Send + Sync {
    /// Fetch up to `depth` daily bars, oldest first.
    async fn fetch_bars(&self, code: &str, depth: usize) -> Result<Vec<DailyBar>, SourceError>;
}

pub struct SinaHistory {
    client: reqwest::Client,
}

impl SinaHistory {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()
            .map_err(|e| SourceError::network(SOURCE_NAME, e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BarSource for SinaHistory {
    async fn fetch_bars(&self, code: &str, depth: usize) -> Result<Vec<DailyBar>, SourceError> {
        let response = self
            .client
            .get(KLINE_URL)
            .query(&[
                ("symbol", code),
                ("scale", DAILY_SCALE),
                ("ma", "no"),
                ("datalen", &depth.to_string()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::network(SOURCE_NAME, e))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::malformed(SOURCE_NAME, e.to_string()))?;

        let rows = body
            .as_array()
            .ok_or_else(|| SourceError::malformed(SOURCE_NAME, "expected bar array"))?;

        let mut bars = Vec::with_capacity(rows.len());
        for row in rows {
            match parse_bar(row) {
                Some(bar) => bars.push(bar),
                None => debug!(code, row = %row, "skipping unparsable bar"),
            }
        }
        Ok(bars)
    }
}

/// Bar fields arrive as strings.
fn parse_bar(row: &Value) -> Option<DailyBar> {
    let f = |key: &str| row.get(key)?.as_str()?.parse::<f64>().ok();
    Some(DailyBar {
        date: row.get("day")?.as_str()?.to_string(),
        open: f("open")?,
        high: f("high")?,
        low: f("low")?,
        close: f("close")?,
    })
}

// ============================================================================
// Caching provider
// ============================================================================

struct CacheEntry {
    bars: Vec<DailyBar>,
    fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < CACHE_TTL
    }
}

/// Bar supplier with a per-code TTL cache in front of the vendor.
pub struct HistoryProvider<S: BarSource> {
    source: S,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl<S: BarSource> HistoryProvider<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Daily bars for a code, oldest first, from cache when fresh.
    ///
    /// Vendor failure with a stale cache entry falls back to the stale
    /// bars rather than erroring.
    pub async fn bars(&self, code: &str) -> Result<Vec<DailyBar>, SourceError> {
        if let Ok(cache) = self.cache.read() {
            if let Some(entry) = cache.get(code) {
                if entry.is_fresh() {
                    return Ok(entry.bars.clone());
                }
            }
        }

        match self.source.fetch_bars(code, DEFAULT_DEPTH).await {
            Ok(bars) => {
                if let Ok(mut cache) = self.cache.write() {
                    cache.insert(
                        code.to_string(),
                        CacheEntry {
                            bars: bars.clone(),
                            fetched_at: Instant::now(),
                        },
                    );
                }
                Ok(bars)
            }
            Err(e) => {
                if let Ok(cache) = self.cache.read() {
                    if let Some(entry) = cache.get(code) {
                        warn!(code, error = %e, "bar fetch failed, serving stale cache");
                        return Ok(entry.bars.clone());
                    }
                }
                Err(e)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parse_bar() {
        let row = json!({
            "day": "2025-06-02", "open": "10.00", "high": "11.00",
            "low": "9.80", "close": "11.00", "volume": "123456"
        });
        let bar = parse_bar(&row).unwrap();
        assert_eq!(bar.date, "2025-06-02");
        assert_eq!(bar.close, 11.0);
    }

    #[test]
    fn test_parse_bar_rejects_missing_field() {
        let row = json!({ "day": "2025-06-02", "open": "10.00" });
        assert!(parse_bar(&row).is_none());
    }

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BarSource for CountingSource {
        async fn fetch_bars(
            &self,
            _code: &str,
            _depth: usize,
        ) -> Result<Vec<DailyBar>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![DailyBar {
                date: "2025-06-02".to_string(),
                open: 10.0,
                high: 11.0,
                low: 9.8,
                close: 11.0,
            }])
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_vendor() {
        let provider = HistoryProvider::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let first = provider.bars("sh600519").await.unwrap();
        let second = provider.bars("sh600519").await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(provider.source.calls.load(Ordering::SeqCst), 1);
    }

    struct FailingSource;

    #[async_trait]
    impl BarSource for FailingSource {
        async fn fetch_bars(
            &self,
            _code: &str,
            _depth: usize,
        ) -> Result<Vec<DailyBar>, SourceError> {
            Err(SourceError::network("mock", "down"))
        }
    }

    #[tokio::test]
    async fn test_vendor_failure_propagates_without_cache() {
        let provider = HistoryProvider::new(FailingSource);
        assert!(provider.bars("sh600519").await.is_err());
    }
}
