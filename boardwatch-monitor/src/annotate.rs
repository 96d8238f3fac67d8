//! External candidate annotator client.
//!
//! Analysis runs delegate candidate selection and per-security write-ups
//! to a separate annotator service; this module is the HTTP client plus
//! the trait seam the service loop and tests program against. Candidates
//! with codes that do not normalize are dropped at the boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use boardwatch_common::{Error, Result};

use crate::market::normalize_code;
use crate::scheduler::ScanMode;
use crate::watchlist::StrategyTag;

/// One annotated candidate proposed for the watchlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub code: String,
    pub name: String,
    /// Concept / sector label, may be empty
    #[serde(default)]
    pub concept: String,
    /// Short rationale
    #[serde(default)]
    pub reason: String,
    pub score: f64,
    #[serde(default)]
    pub strategy_tag: StrategyTag,
}

/// Supplier of annotated candidates and per-security write-ups.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Propose candidates for the window ending now.
    async fn fetch_candidates(&self, mode: ScanMode, lookback_hours: f64)
        -> Result<Vec<Candidate>>;

    /// One-off write-up for a single security.
    async fn analyze_security(&self, code: &str, name: &str) -> Result<String>;
}

// ============================================================================
// HTTP client
// ============================================================================

#[derive(Serialize)]
struct CandidateRequest<'a> {
    mode: &'a str,
    lookback_hours: f64,
}

#[derive(Deserialize)]
struct CandidateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    code: &'a str,
    name: &'a str,
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    content: String,
}

pub struct RemoteAnnotator {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteAnnotator {
    pub fn new(base_url: String, timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("annotator client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CandidateSource for RemoteAnnotator {
    async fn fetch_candidates(
        &self,
        mode: ScanMode,
        lookback_hours: f64,
    ) -> Result<Vec<Candidate>> {
        let mode_str = match mode {
            ScanMode::Intraday => "intraday",
            ScanMode::AfterHours => "after_hours",
        };
        let url = format!("{}/candidates", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CandidateRequest {
                mode: mode_str,
                lookback_hours,
            })
            .send()
            .await
            .map_err(|e| Error::Vendor(format!("annotator: {}", e)))?;

        let body: CandidateResponse = response
            .json()
            .await
            .map_err(|e| Error::Vendor(format!("annotator payload: {}", e)))?;

        Ok(sanitize_candidates(body.candidates))
    }

    async fn analyze_security(&self, code: &str, name: &str) -> Result<String> {
        let url = format!("{}/analyze", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&AnalyzeRequest { code, name })
            .send()
            .await
            .map_err(|e| Error::Vendor(format!("annotator: {}", e)))?;

        let body: AnalyzeResponse = response
            .json()
            .await
            .map_err(|e| Error::Vendor(format!("annotator payload: {}", e)))?;
        Ok(body.content)
    }
}

/// Normalize candidate codes and drop the ones that do not resolve to a
/// valid A-share identifier.
pub fn sanitize_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut out = Vec::with_capacity(candidates.len());
    for mut cand in candidates {
        match normalize_code(&cand.code) {
            Some(code) => {
                cand.code = code;
                out.push(cand);
            }
            None => {
                warn!(code = %cand.code, name = %cand.name, "dropping candidate with bad code");
            }
        }
    }
    debug!(count = out.len(), "candidates after sanitization");
    out
}

/// Append `extras` to `primary`, skipping codes the primary batch already
/// proposes. Annotated candidates take precedence over scanner promotions.
pub fn merge_candidates(mut primary: Vec<Candidate>, extras: Vec<Candidate>) -> Vec<Candidate> {
    for cand in extras {
        if !primary.iter().any(|c| c.code == cand.code) {
            primary.push(cand);
        }
    }
    primary
}
