//! Vendor source abstraction.
//!
//! Each vendor adapter implements [`QuoteSource`]; the resolver consults
//! declared capabilities before dispatching and walks sources in priority
//! order on failure.

use async_trait::async_trait;
use thiserror::Error;

use crate::market::{IndexQuote, SecuritySnapshot};

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by vendor adapters and the resolver.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport-level failure (connect, TLS, timeout)
    #[error("network error from {source_name}: {message}")]
    Network { source_name: String, message: String },

    /// Vendor answered but the payload did not parse
    #[error("malformed payload from {source_name}: {message}")]
    Malformed { source_name: String, message: String },

    /// Vendor answered but covered too little of the request
    #[error("insufficient coverage from {source_name}: {covered}/{requested}")]
    Coverage {
        source_name: String,
        covered: usize,
        requested: usize,
    },

    /// Operation is outside this source's declared capabilities
    #[error("{source_name} does not support {operation}")]
    Unsupported {
        source_name: String,
        operation: &'static str,
    },

    /// Every eligible source failed for this request
    #[error("all quote sources exhausted for {operation}")]
    Exhausted { operation: &'static str },
}

impl SourceError {
    pub fn network(source_name: &str, err: impl std::fmt::Display) -> Self {
        Self::Network {
            source_name: source_name.to_string(),
            message: err.to_string(),
        }
    }

    pub fn malformed(source_name: &str, message: impl Into<String>) -> Self {
        Self::Malformed {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    /// Whether the resolver should try the next source in order.
    pub fn is_failover(&self) -> bool {
        !matches!(self, Self::Exhausted { .. })
    }
}

impl From<SourceError> for boardwatch_common::Error {
    fn from(e: SourceError) -> Self {
        boardwatch_common::Error::Vendor(e.to_string())
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// What a vendor source can serve. The resolver skips sources missing the
/// capability a request needs instead of letting them fail at runtime.
#[derive(Debug, Clone, Copy)]
pub struct SourceCapabilities {
    /// Can list the whole A-share universe in one sweep
    pub full_universe: bool,
    /// Can quote an explicit list of codes
    pub code_list: bool,
    /// Code-list batch ceiling, if any
    pub max_batch: Option<usize>,
    /// Quotes carry order-book depth (best-ask volume)
    pub microstructure: bool,
    /// Can quote benchmark indices
    pub indices: bool,
}

// ============================================================================
// Source trait
// ============================================================================

/// A single quote vendor.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Source name for logs and error attribution.
    fn name(&self) -> &str;

    /// Resolver ordering; lower runs first.
    fn priority(&self) -> u8;

    fn capabilities(&self) -> SourceCapabilities;

    /// Snapshot the full A-share universe.
    async fn fetch_universe(&self) -> Result<Vec<SecuritySnapshot>, SourceError>;

    /// Quote an explicit code list. Codes the vendor cannot resolve are
    /// silently absent from the result; coverage policy lives in the
    /// resolver.
    async fn fetch_codes(&self, codes: &[String]) -> Result<Vec<SecuritySnapshot>, SourceError>;

    /// Quote benchmark indices.
    async fn fetch_indices(&self, codes: &[String]) -> Result<Vec<IndexQuote>, SourceError> {
        let _ = codes;
        Err(SourceError::Unsupported {
            source_name: self.name().to_string(),
            operation: "indices",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failover_classification() {
        let err = SourceError::network("sina", "connection refused");
        assert!(err.is_failover());

        let err = SourceError::Exhausted { operation: "universe" };
        assert!(!err.is_failover());
    }

    #[test]
    fn test_error_display() {
        let err = SourceError::Coverage {
            source_name: "eastmoney".to_string(),
            covered: 4,
            requested: 10,
        };
        assert_eq!(
            err.to_string(),
            "insufficient coverage from eastmoney: 4/10"
        );
    }
}
