//! Failover resolver over the registered vendor sources.
//!
//! Sources are walked in priority order. A source is skipped when it lacks
//! the capability a request needs; a failing or under-covering source is
//! logged and the next one tried. When every eligible source fails, the
//! arm returns [`SourceError::Exhausted`] and the caller keeps its last
//! good snapshot.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::market::{IndexQuote, SecuritySnapshot};

use super::source::{QuoteSource, SourceError};

/// Minimum fraction of a requested code list the winning source must cover.
pub const MIN_COVERAGE: f64 = 0.8;

pub struct QuoteResolver {
    sources: Vec<Arc<dyn QuoteSource>>,
}

impl QuoteResolver {
    /// Build a resolver over the given sources, ordered by priority.
    pub fn new(mut sources: Vec<Arc<dyn QuoteSource>>) -> Self {
        sources.sort_by_key(|s| s.priority());
        Self { sources }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Snapshot the full universe from the first source that succeeds with
    /// a non-empty result.
    pub async fn fetch_universe(&self) -> Result<Vec<SecuritySnapshot>, SourceError> {
        for source in self.eligible(|c| c.full_universe) {
            debug!(source = source.name(), "fetching universe");
            match source.fetch_universe().await {
                Ok(snapshots) if !snapshots.is_empty() => {
                    info!(
                        source = source.name(),
                        count = snapshots.len(),
                        "universe snapshot"
                    );
                    return Ok(snapshots);
                }
                Ok(_) => {
                    warn!(source = source.name(), "empty universe, trying next source");
                }
                Err(e) if e.is_failover() => {
                    warn!(source = source.name(), error = %e, "universe fetch failed, trying next source");
                }
                Err(e) => return Err(e),
            }
        }
        Err(SourceError::Exhausted { operation: "universe" })
    }

    /// Quote an explicit code list, enforcing the coverage gate.
    ///
    /// A source that answers but resolves fewer than [`MIN_COVERAGE`] of
    /// the requested codes is treated as failed so a degraded vendor
    /// cannot silently blank most of a watchlist.
    pub async fn fetch_codes(
        &self,
        codes: &[String],
    ) -> Result<Vec<SecuritySnapshot>, SourceError> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        for source in self.eligible(|c| c.code_list) {
            let result = self.fetch_codes_from(source.as_ref(), codes).await;
            match result {
                Ok(snapshots) => {
                    let required =
                        (codes.len() as f64 * MIN_COVERAGE).ceil() as usize;
                    if snapshots.len() >= required {
                        debug!(
                            source = source.name(),
                            covered = snapshots.len(),
                            requested = codes.len(),
                            "code quotes"
                        );
                        return Ok(snapshots);
                    }
                    warn!(
                        source = source.name(),
                        covered = snapshots.len(),
                        requested = codes.len(),
                        "coverage below threshold, trying next source"
                    );
                }
                Err(e) if e.is_failover() => {
                    warn!(source = source.name(), error = %e, "code fetch failed, trying next source");
                }
                Err(e) => return Err(e),
            }
        }
        Err(SourceError::Exhausted { operation: "codes" })
    }

    /// Quote benchmark indices from the first capable source.
    pub async fn fetch_indices(
        &self,
        codes: &[String],
    ) -> Result<Vec<IndexQuote>, SourceError> {
        for source in self.eligible(|c| c.indices) {
            match source.fetch_indices(codes).await {
                Ok(quotes) if !quotes.is_empty() => return Ok(quotes),
                Ok(_) => {
                    warn!(source = source.name(), "empty index response, trying next source");
                }
                Err(e) if e.is_failover() => {
                    warn!(source = source.name(), error = %e, "index fetch failed, trying next source");
                }
                Err(e) => return Err(e),
            }
        }
        Err(SourceError::Exhausted { operation: "indices" })
    }

    /// Split a code list into the source's batch size and concatenate the
    /// responses. A wholly failed batch fails the source.
    async fn fetch_codes_from(
        &self,
        source: &dyn QuoteSource,
        codes: &[String],
    ) -> Result<Vec<SecuritySnapshot>, SourceError> {
        let batch = source
            .capabilities()
            .max_batch
            .unwrap_or(codes.len().max(1));
        let mut out = Vec::with_capacity(codes.len());
        for chunk in codes.chunks(batch) {
            out.extend(source.fetch_codes(chunk).await?);
        }
        Ok(out)
    }

    fn eligible<'a>(
        &'a self,
        cap: impl Fn(&super::source::SourceCapabilities) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Arc<dyn QuoteSource>> {
        self.sources.iter().filter(move |s| cap(&s.capabilities()))
    }
}

// ============================================================================
// Tests
// ============================================================================
