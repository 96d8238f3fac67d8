//! Watchlist reconciliation: fold a fresh candidate set into the existing
//! list.
//!
//! Rules, in order of precedence:
//! - Manual entries are immune: never discarded, never replaced.
//! - On an intraday pass, an active scanner-promoted entry absent from the
//!   fresh scan is discarded (kept with a removal marker for possible
//!   revival). Entries with other provenance, and all entries on
//!   after-hours passes, stay put when absent.
//! - A discarded entry that reappears is revived.
//! - A candidate matching an active entry replaces it only on a strictly
//!   higher score; otherwise the existing entry is refreshed in place.
//! - Unseen candidates are appended.
//!
//! Callers re-read the persisted list immediately before the final write
//! so concurrent manual additions survive a long-running analysis pass.

use std::collections::HashMap;

use chrono::{DateTime, Local};
use tracing::info;

use crate::annotate::Candidate;
use crate::metrics::MetricsBlock;
use crate::scan::INTRADAY_REASON;
use crate::scheduler::ScanMode;

use super::{EntryStatus, StrategyTag, WatchEntry};

/// Outcome counters for one reconcile pass, logged by the caller.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: usize,
    pub replaced: usize,
    pub refreshed: usize,
    pub discarded: usize,
    pub revived: usize,
}

fn entry_from_candidate(
    cand: &Candidate,
    metrics: MetricsBlock,
    now: DateTime<Local>,
) -> WatchEntry {
    let mut entry = WatchEntry::new(&cand.code, &cand.name, cand.score, now);
    entry.concept = cand.concept.clone();
    entry.reason = cand.reason.clone();
    entry.strategy_tag = cand.strategy_tag;
    if cand.strategy_tag == StrategyTag::Manual {
        entry.status = EntryStatus::Manual;
    }
    entry.metrics = metrics;
    entry
}

/// Whether an entry was promoted by the intraday scanner, as opposed to
/// an external annotation or the operator.
fn intraday_provenance(entry: &WatchEntry) -> bool {
    entry.strategy_tag == StrategyTag::LimitChase && entry.reason.contains(INTRADAY_REASON)
}

/// Fold `candidates` into `entries` in place.
///
/// `metrics` carries freshly computed metric blocks keyed by code; codes
/// without a block keep their previous metrics. `mode` scopes the discard
/// rule: only an intraday pass may discard, and only entries the intraday
/// scanner promoted, so annotation-derived picks survive scan batches
/// that never mention them.
pub fn reconcile(
    entries: &mut Vec<WatchEntry>,
    candidates: &[Candidate],
    metrics: &HashMap<String, MetricsBlock>,
    mode: ScanMode,
    now: DateTime<Local>,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();
    let by_code: HashMap<&str, &Candidate> =
        candidates.iter().map(|c| (c.code.as_str(), c)).collect();

    // Pass 1: walk existing entries against the candidate set.
    for entry in entries.iter_mut() {
        let fresh_metrics = metrics.get(&entry.code);
        match (by_code.get(entry.code.as_str()), entry.status) {
            (None, EntryStatus::Active)
                if mode == ScanMode::Intraday && intraday_provenance(entry) =>
            {
                entry.discard(now);
                outcome.discarded += 1;
            }
            (None, _) => {}
            (Some(cand), EntryStatus::Discarded) => {
                entry.revive(now);
                entry.score = cand.score;
                entry.concept = cand.concept.clone();
                entry.reason = cand.reason.clone();
                entry.strategy_tag = cand.strategy_tag;
                if let Some(m) = fresh_metrics {
                    entry.metrics = m.clone();
                }
                outcome.revived += 1;
            }
            (Some(cand), EntryStatus::Active) if cand.score > entry.score => {
                let added_at = entry.added_at.clone();
                *entry = entry_from_candidate(cand, fresh_metrics.cloned().unwrap_or_default(), now);
                entry.added_at = added_at;
                outcome.replaced += 1;
            }
            (Some(_), _) => {
                // Manual entries and lower-scored rivals: refresh metrics
                // only, never the operator's pick.
                if let Some(m) = fresh_metrics {
                    entry.metrics = m.clone();
                }
                entry.touch(now);
                outcome.refreshed += 1;
            }
        }
    }

    // Pass 2: append candidates not already tracked.
    for cand in candidates {
        if !entries.iter().any(|e| e.code == cand.code) {
            entries.push(entry_from_candidate(
                cand,
                metrics.get(&cand.code).cloned().unwrap_or_default(),
                now,
            ));
            outcome.added += 1;
        }
    }

    info!(
        added = outcome.added,
        replaced = outcome.replaced,
        refreshed = outcome.refreshed,
        discarded = outcome.discarded,
        revived = outcome.revived,
        "watchlist reconciled"
    );
    outcome
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchlist::REMOVAL_MARKER;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 2, 16, 0, 0).unwrap()
    }

    fn cand(code: &str, score: f64) -> Candidate {
        Candidate {
            code: code.to_string(),
            name: code.to_string(),
            concept: "concept".to_string(),
            reason: "fresh pick".to_string(),
            score,
            strategy_tag: StrategyTag::AggressiveBid,
        }
    }

    fn entry(code: &str, score: f64, status: EntryStatus) -> WatchEntry {
        let mut e = WatchEntry::new(code, code, score, now());
        e.status = status;
        e.reason = "old pick".to_string();
        e.strategy_tag = StrategyTag::AggressiveBid;
        e
    }

    fn scanner_entry(code: &str, score: f64) -> WatchEntry {
        let mut e = WatchEntry::new(code, code, score, now());
        e.reason = INTRADAY_REASON.to_string();
        e.strategy_tag = StrategyTag::LimitChase;
        e
    }

    #[test]
    fn test_absent_scanner_entry_is_discarded_intraday() {
        let mut entries = vec![scanner_entry("sh600001", 7.0)];
        let outcome = reconcile(&mut entries, &[], &HashMap::new(), ScanMode::Intraday, now());
        assert_eq!(outcome.discarded, 1);
        assert_eq!(entries[0].status, EntryStatus::Discarded);
        assert!(entries[0].reason.ends_with(REMOVAL_MARKER));
    }

    #[test]
    fn test_after_hours_pass_never_discards() {
        let mut entries = vec![scanner_entry("sh600001", 7.0)];
        let outcome = reconcile(&mut entries, &[], &HashMap::new(), ScanMode::AfterHours, now());
        assert_eq!(outcome.discarded, 0);
        assert_eq!(entries[0].status, EntryStatus::Active);
    }

    #[test]
    fn test_intraday_pass_keeps_annotated_entries() {
        // An annotation-derived pick absent from the scan batch is not
        // the scanner's to discard.
        let mut entries = vec![entry("sh600001", 7.0, EntryStatus::Active)];
        entries[0].reason = "policy tailwind".to_string();
        let outcome = reconcile(
            &mut entries,
            &[cand("sh600099", 6.0)],
            &HashMap::new(),
            ScanMode::Intraday,
            now(),
        );
        assert_eq!(outcome.discarded, 0);
        assert_eq!(entries[0].status, EntryStatus::Active);
        assert_eq!(entries[0].reason, "policy tailwind");
    }

    #[test]
    fn test_manual_entry_is_immune() {
        let mut entries = vec![entry("sh600001", 7.0, EntryStatus::Manual)];

        // Absent from candidates: not discarded
        let outcome = reconcile(&mut entries, &[], &HashMap::new(), ScanMode::Intraday, now());
        assert_eq!(outcome.discarded, 0);
        assert_eq!(entries[0].status, EntryStatus::Manual);

        // Present with a higher score: not replaced
        let outcome = reconcile(
            &mut entries,
            &[cand("sh600001", 9.9)],
            &HashMap::new(),
            ScanMode::Intraday,
            now(),
        );
        assert_eq!(outcome.replaced, 0);
        assert_eq!(outcome.refreshed, 1);
        assert_eq!(entries[0].reason, "old pick");
        assert_eq!(entries[0].score, 7.0);
    }

    #[test]
    fn test_reappearing_discarded_entry_is_revived() {
        let mut entries = vec![scanner_entry("sh600001", 7.0)];
        reconcile(&mut entries, &[], &HashMap::new(), ScanMode::Intraday, now());
        assert_eq!(entries[0].status, EntryStatus::Discarded);

        let outcome = reconcile(
            &mut entries,
            &[cand("sh600001", 8.0)],
            &HashMap::new(),
            ScanMode::Intraday,
            now(),
        );
        assert_eq!(outcome.revived, 1);
        assert_eq!(entries[0].status, EntryStatus::Active);
        assert_eq!(entries[0].score, 8.0);
        assert!(!entries[0].reason.ends_with(REMOVAL_MARKER));
    }

    #[test]
    fn test_replace_requires_strictly_higher_score() {
        let mut entries = vec![entry("sh600001", 7.0, EntryStatus::Active)];

        // Equal score refreshes, keeps the original reason
        let outcome = reconcile(
            &mut entries,
            &[cand("sh600001", 7.0)],
            &HashMap::new(),
            ScanMode::AfterHours,
            now(),
        );
        assert_eq!(outcome.replaced, 0);
        assert_eq!(outcome.refreshed, 1);
        assert_eq!(entries[0].reason, "old pick");

        // Higher score replaces
        let outcome = reconcile(
            &mut entries,
            &[cand("sh600001", 8.5)],
            &HashMap::new(),
            ScanMode::AfterHours,
            now(),
        );
        assert_eq!(outcome.replaced, 1);
        assert_eq!(entries[0].reason, "fresh pick");
        assert_eq!(entries[0].score, 8.5);
    }

    #[test]
    fn test_replacement_preserves_added_at() {
        let mut entries = vec![entry("sh600001", 7.0, EntryStatus::Active)];
        entries[0].added_at = "2025-05-01 10:00:00".to_string();
        reconcile(
            &mut entries,
            &[cand("sh600001", 9.0)],
            &HashMap::new(),
            ScanMode::AfterHours,
            now(),
        );
        assert_eq!(entries[0].added_at, "2025-05-01 10:00:00");
    }

    #[test]
    fn test_new_candidates_appended_with_metrics() {
        let mut entries = Vec::new();
        let mut metrics = HashMap::new();
        metrics.insert(
            "sh600001".to_string(),
            MetricsBlock {
                seal_rate: 80.0,
                ..Default::default()
            },
        );
        let outcome = reconcile(
            &mut entries,
            &[cand("sh600001", 8.0)],
            &metrics,
            ScanMode::AfterHours,
            now(),
        );
        assert_eq!(outcome.added, 1);
        assert_eq!(entries[0].metrics.seal_rate, 80.0);
    }

    #[test]
    fn test_manual_candidate_enters_as_manual() {
        let mut entries = Vec::new();
        let mut c = cand("sh600001", 8.0);
        c.strategy_tag = StrategyTag::Manual;
        reconcile(&mut entries, &[c], &HashMap::new(), ScanMode::AfterHours, now());
        assert_eq!(entries[0].status, EntryStatus::Manual);
    }
}
