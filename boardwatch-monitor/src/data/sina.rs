//! Sina quote adapter.
//!
//! Two surfaces: the GBK-encoded `hq.sinajs.cn` batch quote endpoint
//! (up to 50 codes per request, carries best-ask depth, also serves the
//! benchmark indices) and the JSON `Market_Center` listing used as the
//! fallback universe sweep.

use std::time::Duration;

use async_trait::async_trait;
use encoding_rs::GBK;
use serde_json::Value;
use tracing::{debug, warn};

use crate::market::{normalize_code, round2, IndexQuote, SecuritySnapshot};

use super::source::{QuoteSource, SourceCapabilities, SourceError};

const SOURCE_NAME: &str = "sina";
const QUOTE_URL: &str = "https://hq.sinajs.cn/list=";
const LIST_URL: &str =
    "https://vip.stock.finance.sina.com.cn/quotes_service/api/json_v2.php/Market_Center.getHQNodeData";
/// The quote endpoint rejects requests without a Sina referer.
const REFERER: &str = "https://finance.sina.com.cn";
const MAX_BATCH: usize = 50;

pub struct SinaSource {
    client: reqwest::Client,
}

impl SinaSource {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()
            .map_err(|e| SourceError::network(SOURCE_NAME, e))?;
        Ok(Self { client })
    }

    /// Fetch the raw GBK quote payload for a code list and decode it.
    async fn fetch_raw(&self, codes: &[String]) -> Result<String, SourceError> {
        let url = format!("{}{}", QUOTE_URL, codes.join(","));
        let response = self
            .client
            .get(&url)
            .header("Referer", REFERER)
            .send()
            .await
            .map_err(|e| SourceError::network(SOURCE_NAME, e))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::network(SOURCE_NAME, e))?;

        let (text, _, _) = GBK.decode(&bytes);
        Ok(text.into_owned())
    }
}

#[async_trait]
impl QuoteSource for SinaSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn priority(&self) -> u8 {
        2
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            full_universe: true,
            code_list: true,
            max_batch: Some(MAX_BATCH),
            microstructure: true,
            indices: true,
        }
    }

    async fn fetch_universe(&self) -> Result<Vec<SecuritySnapshot>, SourceError> {
        let response = self
            .client
            .get(LIST_URL)
            .query(&[
                ("page", "1"),
                ("num", "5000"),
                ("sort", "changepercent"),
                ("asc", "0"),
                ("node", "hs_a"),
            ])
            .send()
            .await
            .map_err(|e| SourceError::network(SOURCE_NAME, e))?;

        let body: Vec<Value> = response
            .json()
            .await
            .map_err(|e| SourceError::malformed(SOURCE_NAME, e.to_string()))?;

        let mut out = Vec::with_capacity(body.len());
        for row in &body {
            match parse_list_row(row) {
                Some(snap) => out.push(snap),
                None => debug!(row = %row, "skipping unparsable record"),
            }
        }
        if out.is_empty() {
            warn!("listing sweep returned no parsable records");
        }
        Ok(out)
    }

    async fn fetch_codes(&self, codes: &[String]) -> Result<Vec<SecuritySnapshot>, SourceError> {
        let mut out = Vec::with_capacity(codes.len());
        for chunk in codes.chunks(MAX_BATCH) {
            let text = self.fetch_raw(chunk).await?;
            for line in text.lines() {
                if let Some((code, snap)) = parse_quote_line(line) {
                    match snap {
                        Some(snap) => out.push(snap),
                        None => debug!(code = %code, "empty quote, dropping"),
                    }
                }
            }
        }
        Ok(out)
    }

    async fn fetch_indices(&self, codes: &[String]) -> Result<Vec<IndexQuote>, SourceError> {
        let text = self.fetch_raw(codes).await?;
        let mut out = Vec::with_capacity(codes.len());
        for line in text.lines() {
            if let Some(quote) = parse_index_line(line) {
                out.push(quote);
            }
        }
        Ok(out)
    }
}

// ============================================================================
// Payload parsing
// ============================================================================

/// Split one `var hq_str_shXXXXXX="..."` line into code and payload.
fn split_line(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("var hq_str_")?;
    let eq = rest.find('=')?;
    let code = &rest[..eq];
    let payload = rest[eq + 1..].trim_end_matches(';').trim_matches('"');
    Some((code, payload))
}

/// Parse one security quote line. Outer `None` means the line is not a
/// quote line at all; inner `None` means the vendor returned an empty
/// payload for this code (unknown or delisted).
fn parse_quote_line(line: &str) -> Option<(String, Option<SecuritySnapshot>)> {
    let (code, payload) = split_line(line)?;
    let code = code.to_string();
    if payload.is_empty() {
        return Some((code, None));
    }

    let fields: Vec<&str> = payload.split(',').collect();
    if fields.len() < 22 {
        return Some((code, None));
    }

    let f = |i: usize| fields.get(i).and_then(|s| s.parse::<f64>().ok());
    let prev_close = f(2)?;
    let mut current = f(3)?;
    // Pre-open or suspended quotes report zero
    if current == 0.0 {
        current = prev_close;
    }
    let change_percent = if prev_close > 0.0 {
        round2((current - prev_close) / prev_close * 100.0)
    } else {
        0.0
    };

    let snap = SecuritySnapshot {
        code: code.clone(),
        name: fields[0].to_string(),
        current,
        prev_close,
        open: f(1).unwrap_or(0.0),
        high: f(4).unwrap_or(0.0),
        low: f(5).unwrap_or(0.0),
        change_percent,
        turnover: 0.0,
        circulation_value: 0.0,
        ask1_volume: f(20),
    };
    Some((code, Some(snap)))
}

/// Parse one index quote line; traded value converts from yuan to 亿.
fn parse_index_line(line: &str) -> Option<IndexQuote> {
    let (code, payload) = split_line(line)?;
    let fields: Vec<&str> = payload.split(',').collect();
    if fields.len() < 10 {
        return None;
    }
    let f = |i: usize| fields.get(i).and_then(|s| s.parse::<f64>().ok());
    let current = f(3)?;
    let prev_close = f(2)?;
    let change_percent = if prev_close > 0.0 {
        round2((current - prev_close) / prev_close * 100.0)
    } else {
        0.0
    };
    Some(IndexQuote {
        code: code.to_string(),
        name: fields[0].to_string(),
        current,
        change_percent,
        amount: round2(f(9).unwrap_or(0.0) / 1e8),
    })
}

fn parse_list_row(row: &Value) -> Option<SecuritySnapshot> {
    let code = normalize_code(row.get("symbol")?.as_str()?)?;
    let name = row.get("name")?.as_str()?.to_string();

    // The listing mixes numeric and string-typed numbers
    let f = |key: &str| -> Option<f64> {
        let v = row.get(key)?;
        v.as_f64().or_else(|| v.as_str()?.parse().ok())
    };

    let current = f("trade")?;
    let prev_close = f("settlement")?;

    Some(SecuritySnapshot {
        code,
        name,
        current,
        prev_close,
        open: f("open").unwrap_or(0.0),
        high: f("high").unwrap_or(0.0),
        low: f("low").unwrap_or(0.0),
        change_percent: f("changepercent").unwrap_or(0.0),
        turnover: f("turnoverratio").unwrap_or(0.0),
        circulation_value: f("nmc").unwrap_or(0.0),
        ask1_volume: None,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const QUOTE_LINE: &str = concat!(
        "var hq_str_sz002405=\"四维图新,10.00,10.00,11.00,11.00,9.90,11.00,0.00,",
        "12345678,135802468.00,0,11.00,0,0,0,0,0,0,0,0,0,0,",
        "2025-06-02,15:00:00,00\";"
    );

    #[test]
    fn test_parse_quote_line_sealed() {
        let (code, snap) = parse_quote_line(QUOTE_LINE).unwrap();
        let snap = snap.unwrap();
        assert_eq!(code, "sz002405");
        assert_eq!(snap.name, "四维图新");
        assert_eq!(snap.current, 11.0);
        assert_eq!(snap.prev_close, 10.0);
        assert_eq!(snap.high, 11.0);
        // Field 20 is best-ask volume; zero means no sellers left
        assert_eq!(snap.ask1_volume, Some(0.0));
    }

    #[test]
    fn test_parse_quote_line_zero_current_falls_back() {
        let line = concat!(
            "var hq_str_sh600001=\"测试,0.00,10.00,0.00,0.00,0.00,0,0,",
            "0,0,0,0,0,0,0,0,0,0,0,0,500,0,2025-06-02,09:10:00,00\";"
        );
        let (_, snap) = parse_quote_line(line).unwrap();
        let snap = snap.unwrap();
        assert_eq!(snap.current, 10.0);
        assert_eq!(snap.change_percent, 0.0);
        assert_eq!(snap.ask1_volume, Some(500.0));
    }

    #[test]
    fn test_parse_quote_line_empty_payload() {
        let (code, snap) = parse_quote_line("var hq_str_sh999999=\"\";").unwrap();
        assert_eq!(code, "sh999999");
        assert!(snap.is_none());
    }

    #[test]
    fn test_parse_quote_line_garbage() {
        assert!(parse_quote_line("not a quote line").is_none());
    }

    #[test]
    fn test_parse_index_line() {
        let line = concat!(
            "var hq_str_sh000001=\"上证指数,3190.0,3200.0,3168.0,3210.0,3150.0,",
            "0,0,280000000,534200000000\";"
        );
        let quote = parse_index_line(line).unwrap();
        assert_eq!(quote.code, "sh000001");
        assert_eq!(quote.change_percent, -1.0);
        assert_eq!(quote.amount, 5342.0);
    }

    #[test]
    fn test_parse_list_row_string_numbers() {
        let row = serde_json::json!({
            "symbol": "sh600519", "name": "贵州茅台",
            "trade": "1700.00", "settlement": "1680.00",
            "changepercent": 1.19, "high": "1710.00", "low": "1680.00",
            "open": "1690.00", "turnoverratio": 0.5, "nmc": 21356.0
        });
        let snap = parse_list_row(&row).unwrap();
        assert_eq!(snap.code, "sh600519");
        assert_eq!(snap.current, 1700.0);
        assert_eq!(snap.change_percent, 1.19);
    }
}
