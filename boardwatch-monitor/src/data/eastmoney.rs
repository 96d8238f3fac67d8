//! Eastmoney quote adapter.
//!
//! Serves the full-universe sweep through the paged `clist` endpoint and
//! bounded code lists through `ulist.np`. Snapshots carry no order-book
//! depth, so sealed/attempt refinement is left to a microstructure-capable
//! source.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::market::{normalize_code, round2, SecuritySnapshot};

use super::source::{QuoteSource, SourceCapabilities, SourceError};

const SOURCE_NAME: &str = "eastmoney";
const BASE_URL: &str = "https://push2.eastmoney.com/api/qt/clist/get";
const ULIST_URL: &str = "https://push2.eastmoney.com/api/qt/ulist.np/get";
const MAX_BATCH: usize = 50;

/// A-share universe filter: SH/SZ main boards, ChiNext, STAR, BSE.
const UNIVERSE_FILTER: &str = "m:0+t:6,m:0+t:80,m:1+t:2,m:1+t:23,m:0+t:81+s:2048";
/// Quote fields: code, name, current, change, turnover, high, low, open,
/// prev close, circulating value, 5-minute speed.
const FIELDS: &str = "f12,f14,f2,f3,f8,f15,f16,f17,f18,f21,f22";
const PAGE_SIZE: usize = 500;

pub struct EastmoneySource {
    client: reqwest::Client,
}

impl EastmoneySource {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()
            .map_err(|e| SourceError::network(SOURCE_NAME, e))?;
        Ok(Self { client })
    }

    async fn fetch_page(&self, page: usize) -> Result<Vec<Value>, SourceError> {
        let response = self
            .client
            .get(BASE_URL)
            .query(&[
                ("pn", page.to_string()),
                ("pz", PAGE_SIZE.to_string()),
                ("po", "1".to_string()),
                ("np", "1".to_string()),
                ("ut", "bd1d9ddb04089700cf9c27f6f7426281".to_string()),
                ("fltt", "2".to_string()),
                ("invt", "2".to_string()),
                ("fid", "f3".to_string()),
                ("fs", UNIVERSE_FILTER.to_string()),
                ("fields", FIELDS.to_string()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::network(SOURCE_NAME, e))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::malformed(SOURCE_NAME, e.to_string()))?;

        match body.pointer("/data/diff") {
            Some(Value::Array(rows)) => Ok(rows.clone()),
            // End of pagination: data comes back null
            Some(Value::Null) | None if body.get("data").is_some() => Ok(Vec::new()),
            _ => Err(SourceError::malformed(SOURCE_NAME, "missing data.diff")),
        }
    }
}

/// Exchange-qualified code into the `market.code` form the quote APIs use.
fn secid(code: &str) -> String {
    let raw = crate::market::strip_prefix(code);
    let market = if code.starts_with("sh") { 1 } else { 0 };
    format!("{}.{}", market, raw)
}

#[async_trait]
impl QuoteSource for EastmoneySource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn priority(&self) -> u8 {
        1
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            full_universe: true,
            code_list: true,
            max_batch: Some(MAX_BATCH),
            microstructure: false,
            indices: false,
        }
    }

    async fn fetch_universe(&self) -> Result<Vec<SecuritySnapshot>, SourceError> {
        let mut out = Vec::new();
        let mut page = 1;
        loop {
            let rows = self.fetch_page(page).await?;
            if rows.is_empty() {
                break;
            }
            let page_len = rows.len();
            for row in &rows {
                match parse_row(row) {
                    Some(snap) => out.push(snap),
                    None => {
                        // Suspended or malformed records are dropped rather
                        // than failing the sweep.
                        debug!(row = %row, "skipping unparsable record");
                    }
                }
            }
            if page_len < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        if out.is_empty() {
            warn!("universe sweep returned no parsable records");
        }
        Ok(out)
    }

    async fn fetch_codes(&self, codes: &[String]) -> Result<Vec<SecuritySnapshot>, SourceError> {
        let secids = codes.iter().map(|c| secid(c)).collect::<Vec<_>>().join(",");
        let response = self
            .client
            .get(ULIST_URL)
            .query(&[
                ("ut", "bd1d9ddb04089700cf9c27f6f7426281"),
                ("fltt", "2"),
                ("invt", "2"),
                ("fields", FIELDS),
                ("secids", secids.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::network(SOURCE_NAME, e))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::malformed(SOURCE_NAME, e.to_string()))?;

        let rows = match body.pointer("/data/diff") {
            Some(Value::Array(rows)) => rows.clone(),
            _ => return Err(SourceError::malformed(SOURCE_NAME, "missing data.diff")),
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            match parse_row(row) {
                Some(snap) => out.push(snap),
                None => debug!(row = %row, "skipping unparsable record"),
            }
        }
        Ok(out)
    }
}

/// Numeric field that may come back as "-" for suspended securities.
fn num(row: &Value, key: &str) -> Option<f64> {
    row.get(key)?.as_f64()
}

fn parse_row(row: &Value) -> Option<SecuritySnapshot> {
    let code = normalize_code(row.get("f12")?.as_str()?)?;
    let name = row.get("f14")?.as_str()?.to_string();
    let current = num(row, "f2")?;
    let prev_close = num(row, "f18")?;

    Some(SecuritySnapshot {
        code,
        name,
        current,
        prev_close,
        open: num(row, "f17").unwrap_or(0.0),
        high: num(row, "f15").unwrap_or(0.0),
        low: num(row, "f16").unwrap_or(0.0),
        change_percent: num(row, "f3").unwrap_or_else(|| {
            if prev_close > 0.0 {
                round2((current - prev_close) / prev_close * 100.0)
            } else {
                0.0
            }
        }),
        turnover: num(row, "f8").unwrap_or(0.0),
        circulation_value: num(row, "f21").unwrap_or(0.0),
        ask1_volume: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_row() {
        let row = json!({
            "f12": "600519", "f14": "贵州茅台", "f2": 1700.0, "f3": 1.2,
            "f8": 0.5, "f15": 1710.0, "f16": 1680.0, "f17": 1690.0,
            "f18": 1680.0, "f21": 2.1e12, "f22": 0.1
        });
        let snap = parse_row(&row).unwrap();
        assert_eq!(snap.code, "sh600519");
        assert_eq!(snap.current, 1700.0);
        assert_eq!(snap.prev_close, 1680.0);
        assert_eq!(snap.ask1_volume, None);
    }

    #[test]
    fn test_parse_row_skips_suspended() {
        // Suspended securities report "-" for prices
        let row = json!({
            "f12": "600001", "f14": "suspended", "f2": "-", "f18": "-"
        });
        assert!(parse_row(&row).is_none());
    }

    #[test]
    fn test_secid_mapping() {
        assert_eq!(secid("sh600519"), "1.600519");
        assert_eq!(secid("sz300059"), "0.300059");
        assert_eq!(secid("bj830799"), "0.830799");
    }

    #[test]
    fn test_parse_row_skips_bad_code() {
        let row = json!({
            "f12": "ABC123", "f14": "bad", "f2": 10.0, "f18": 9.5
        });
        assert!(parse_row(&row).is_none());
    }
}
