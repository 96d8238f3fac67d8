//! Limit-up monitoring service.
//!
//! Wires the quote resolver, the scan/metrics pipeline, the scheduler, and
//! the watchlist reconciler together behind an HTTP surface. The service
//! owns four background loops: the analysis scheduler, the pool refresher,
//! the intraday scanner, and the watchlist quote refresher.

pub mod annotate;
pub mod data;
pub mod market;
pub mod metrics;
pub mod routes;
pub mod scan;
pub mod scheduler;
pub mod watchlist;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use boardwatch_common::logging::generate_run_id;
use boardwatch_common::{Config, Result};

use annotate::{Candidate, CandidateSource, RemoteAnnotator};
use data::eastmoney::EastmoneySource;
use data::history::{HistoryProvider, SinaHistory};
use data::resolver::QuoteResolver;
use data::sina::SinaSource;
use data::source::QuoteSource;
use market::{calendar, SecuritySnapshot};
use scan::{IntradayCandidate, MarketPools, PoolEntry};
use scheduler::{Cadence, ScanMode, Scheduler};
use watchlist::store::{CachedAnalysis, WatchlistStore};
use watchlist::{StrategyTag, WatchEntry};

/// Benchmark indices served by the sentiment endpoint; the first one is
/// the sentiment benchmark.
pub const INDEX_CODES: [&str; 3] = ["sh000001", "sz399001", "sz399006"];

/// A persisted watchlist younger than this at startup seeds the scheduler
/// instead of triggering an immediate run.
const STARTUP_FRESHNESS: Duration = Duration::from_secs(3600);

const SCHEDULER_TICK: Duration = Duration::from_secs(5);
const POOL_REFRESH_INTERVAL: Duration = Duration::from_secs(10);
const INTRADAY_SCAN_INTERVAL: Duration = Duration::from_secs(10);
const WATCH_QUOTE_INTERVAL: Duration = Duration::from_secs(5);
const OFF_HOURS_IDLE: Duration = Duration::from_secs(60);

// ============================================================================
// Shared state
// ============================================================================

/// Shared state behind every loop and handler.
pub struct MonitorState {
    pub config: RwLock<Config>,
    pub resolver: QuoteResolver,
    pub history: HistoryProvider<SinaHistory>,
    pub annotator: Option<Arc<dyn CandidateSource>>,
    pub store: WatchlistStore,
    pub scheduler: Mutex<Scheduler>,

    /// Latest full-universe snapshot
    pub universe: RwLock<Vec<SecuritySnapshot>>,
    /// The day's limit pools
    pub pools: RwLock<MarketPools>,
    /// Latest intraday surge candidates
    pub intraday: RwLock<Vec<IntradayCandidate>>,
    /// Seals spotted between pool refreshes, staged for the refresh loop
    /// so the pools keep a single writer
    pending_seals: Mutex<Vec<PoolEntry>>,
    /// The watchlist itself
    pub watchlist: RwLock<Vec<WatchEntry>>,
    /// Live quotes for watchlist codes
    pub watch_quotes: RwLock<HashMap<String, SecuritySnapshot>>,
    /// Per-security analysis write-ups
    pub analysis_cache: RwLock<HashMap<String, CachedAnalysis>>,
}

impl MonitorState {
    pub fn new(config: Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.monitor.vendor_timeout_secs);

        let sources: Vec<Arc<dyn QuoteSource>> = vec![
            Arc::new(EastmoneySource::new(timeout)?),
            Arc::new(SinaSource::new(timeout)?),
        ];
        let resolver = QuoteResolver::new(sources);
        let history = HistoryProvider::new(SinaHistory::new(timeout)?);

        let annotator: Option<Arc<dyn CandidateSource>> = match &config.monitor.annotator_url {
            Some(url) => Some(Arc::new(RemoteAnnotator::new(url.clone(), timeout)?)),
            None => None,
        };

        Ok(Self {
            config: RwLock::new(config),
            resolver,
            history,
            annotator,
            store: WatchlistStore::at_data_dir(),
            scheduler: Mutex::new(Scheduler::new()),
            universe: RwLock::new(Vec::new()),
            pools: RwLock::new(MarketPools::default()),
            intraday: RwLock::new(Vec::new()),
            pending_seals: Mutex::new(Vec::new()),
            watchlist: RwLock::new(Vec::new()),
            watch_quotes: RwLock::new(HashMap::new()),
            analysis_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Load persisted documents and seed the scheduler from watchlist age.
    async fn restore(&self) {
        let entries = self.store.load_watchlist();
        if !entries.is_empty() {
            info!(count = entries.len(), "restored watchlist");
        }
        *self.watchlist.write().await = entries;
        *self.pools.write().await = self.store.load_pools();
        *self.analysis_cache.write().await = self.store.load_analysis_cache();

        if let Some(age) = self.store.watchlist_age() {
            if age < STARTUP_FRESHNESS {
                let seeded = Local::now()
                    - chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::zero());
                self.scheduler.lock().await.seed_last_run(seeded);
                info!(age_secs = age.as_secs(), "recent watchlist found, skipping startup run");
            }
        }
    }

    // ========================================================================
    // Analysis runs
    // ========================================================================

    /// One full analysis pass: candidates, metrics, reconcile, persist.
    pub async fn run_analysis(&self, cadence: Cadence) -> Result<()> {
        let run_id = generate_run_id();
        info!(run_id = %run_id, mode = ?cadence.mode, lookback = cadence.lookback_hours, "analysis run started");

        let candidates = self.collect_candidates(cadence).await?;
        let metrics = self.compute_candidate_metrics(&candidates).await;

        // Re-read the persisted list so manual additions made while the
        // candidates were being gathered are not clobbered.
        let mut entries = self.store.load_watchlist();
        let outcome = watchlist::reconcile::reconcile(
            &mut entries,
            &candidates,
            &metrics,
            cadence.mode,
            Local::now(),
        );

        if let Err(e) = self.store.save_watchlist(&entries) {
            warn!(error = %e, "watchlist persist failed, keeping in-memory state");
        }
        *self.watchlist.write().await = entries;

        info!(run_id = %run_id, added = outcome.added, discarded = outcome.discarded, "analysis run finished");
        Ok(())
    }

    /// Candidates for a run. With an annotator configured, intraday passes
    /// merge its batch with the scanner promotions so neither arm starves
    /// the reconciler; other passes use the batch alone. Without one, the
    /// scanner promotions are all there is.
    async fn collect_candidates(&self, cadence: Cadence) -> Result<Vec<Candidate>> {
        let annotator = match &self.annotator {
            Some(annotator) => annotator,
            None => return Ok(self.promoted_intraday().await),
        };
        let batch = annotator
            .fetch_candidates(cadence.mode, cadence.lookback_hours)
            .await?;
        if cadence.mode == ScanMode::Intraday {
            Ok(annotate::merge_candidates(batch, self.promoted_intraday().await))
        } else {
            Ok(batch)
        }
    }

    /// The latest intraday surge scan as watchlist candidates.
    async fn promoted_intraday(&self) -> Vec<Candidate> {
        let staged = self.intraday.read().await.clone();
        staged
            .into_iter()
            .map(|c| Candidate {
                code: c.code,
                name: c.name,
                concept: String::new(),
                reason: scan::INTRADAY_REASON.to_string(),
                score: c.score,
                strategy_tag: c.strategy_tag,
            })
            .collect()
    }

    /// Metrics blocks for every candidate whose history resolves; a failed
    /// fetch drops that code's block rather than the run.
    async fn compute_candidate_metrics(
        &self,
        candidates: &[Candidate],
    ) -> HashMap<String, metrics::MetricsBlock> {
        let fetches = candidates.iter().map(|cand| async move {
            (cand.code.clone(), self.history.bars(&cand.code).await)
        });

        let mut out = HashMap::new();
        for (code, result) in futures::future::join_all(fetches).await {
            match result {
                Ok(bars) => {
                    let board = market::BoardType::from_code(&code);
                    out.insert(code, metrics::compute_metrics(&bars, board));
                }
                Err(e) => {
                    warn!(code = %code, error = %e, "bar history unavailable for metrics");
                }
            }
        }
        out
    }

    /// Fill metric blocks on pool entries that still carry defaults.
    /// Vendor failures leave the block empty until the next pass.
    async fn enrich_pool_metrics(&self, pools: &mut MarketPools) {
        let codes: Vec<String> = pools
            .limit_up
            .iter()
            .chain(pools.broken.iter())
            .filter(|e| e.metrics == metrics::MetricsBlock::default())
            .map(|e| e.code.clone())
            .collect();
        if codes.is_empty() {
            return;
        }

        let fetches = codes
            .iter()
            .map(|code| async move { (code.clone(), self.history.bars(code).await) });
        let mut blocks = HashMap::new();
        for (code, result) in futures::future::join_all(fetches).await {
            if let Ok(bars) = result {
                let board = market::BoardType::from_code(&code);
                blocks.insert(code, metrics::compute_metrics(&bars, board));
            }
        }

        for entry in pools.limit_up.iter_mut().chain(pools.broken.iter_mut()) {
            if let Some(block) = blocks.get(&entry.code) {
                entry.metrics = block.clone();
            }
        }
    }

    /// Add a hand-picked code to the watchlist. An existing entry is
    /// promoted to manual status instead of duplicated.
    pub async fn add_manual(&self, code: &str) -> Result<WatchEntry> {
        let code = market::normalize_code(code)
            .ok_or_else(|| boardwatch_common::Error::InvalidInput(format!("bad code: {code}")))?;

        let quotes = self.resolver.fetch_codes(&[code.clone()]).await?;
        let snap = quotes
            .into_iter()
            .next()
            .ok_or_else(|| boardwatch_common::Error::NotFound(format!("no quote for {code}")))?;

        let board = market::BoardType::from_code(&code);
        let block = match self.history.bars(&code).await {
            Ok(bars) => metrics::compute_metrics(&bars, board),
            Err(e) => {
                warn!(code = %code, error = %e, "bar history unavailable for manual add");
                metrics::MetricsBlock::default()
            }
        };

        let now = Local::now();
        let mut entries = self.watchlist.write().await;
        let entry = match entries.iter().position(|e| e.code == code) {
            Some(i) => {
                let existing = &mut entries[i];
                existing.status = watchlist::EntryStatus::Manual;
                existing.strategy_tag = StrategyTag::Manual;
                existing.metrics = block;
                existing.touch(now);
                existing.clone()
            }
            None => {
                // Default score for hand-picked entries
                let mut entry = WatchEntry::new(&code, &snap.name, 5.0, now);
                entry.status = watchlist::EntryStatus::Manual;
                entry.strategy_tag = StrategyTag::Manual;
                entry.reason = "manually added".to_string();
                entry.metrics = block;
                entries.push(entry.clone());
                entry
            }
        };
        if let Err(e) = self.store.save_watchlist(&entries) {
            warn!(error = %e, "watchlist persist failed");
        }
        Ok(entry)
    }

    /// Drop a code from the watchlist entirely.
    pub async fn remove_entry(&self, code: &str) -> Result<()> {
        let mut entries = self.watchlist.write().await;
        let before = entries.len();
        entries.retain(|e| e.code != code);
        if entries.len() == before {
            return Err(boardwatch_common::Error::NotFound(format!(
                "{code} is not on the watchlist"
            )));
        }
        if let Err(e) = self.store.save_watchlist(&entries) {
            warn!(error = %e, "watchlist persist failed");
        }
        Ok(())
    }

    /// Per-security write-up, served from the analysis cache when fresh.
    pub async fn analyze_security(&self, code: &str) -> Result<String> {
        let code = market::normalize_code(code)
            .ok_or_else(|| boardwatch_common::Error::InvalidInput(format!("bad code: {code}")))?;

        let now = Local::now();
        if let Some(cached) = self.analysis_cache.read().await.get(&code) {
            if cached.is_fresh(now) {
                return Ok(cached.content.clone());
            }
        }

        let annotator = self
            .annotator
            .as_ref()
            .ok_or_else(|| boardwatch_common::Error::Config("no annotator configured".into()))?;

        let name = {
            let quotes = self.resolver.fetch_codes(&[code.clone()]).await?;
            quotes.into_iter().next().map(|s| s.name).unwrap_or_default()
        };
        let content = annotator.analyze_security(&code, &name).await?;

        let mut cache = self.analysis_cache.write().await;
        cache.insert(
            code,
            CachedAnalysis {
                content: content.clone(),
                timestamp: watchlist::format_timestamp(now),
            },
        );
        if let Err(e) = self.store.save_analysis_cache(&cache) {
            warn!(error = %e, "analysis cache persist failed");
        }
        Ok(content)
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct MonitorService {
    state: Arc<MonitorState>,
}

impl MonitorService {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            state: Arc::new(MonitorState::new(config)?),
        })
    }

    pub fn state(&self) -> Arc<MonitorState> {
        Arc::clone(&self.state)
    }

    /// Restore persisted state, spawn the background loops, and serve the
    /// HTTP API until the process is stopped.
    pub async fn start(&self) -> Result<()> {
        self.state.restore().await;

        tokio::spawn(scheduler_loop(Arc::clone(&self.state)));
        tokio::spawn(pool_refresh_loop(Arc::clone(&self.state)));
        tokio::spawn(intraday_scan_loop(Arc::clone(&self.state)));
        tokio::spawn(watch_quote_loop(Arc::clone(&self.state)));

        let bind_address = self.state.config.read().await.bind_address();
        let app = routes::router(Arc::clone(&self.state));
        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "monitor listening");
        axum::serve(listener, app).await?;
        Ok(())
    }
}

// ============================================================================
// Background loops
// ============================================================================

async fn scheduler_loop(state: Arc<MonitorState>) {
    loop {
        tokio::time::sleep(SCHEDULER_TICK).await;
        let now = Local::now();
        let config = state.config.read().await.monitor.clone();

        let cadence = {
            let mut scheduler = state.scheduler.lock().await;
            match scheduler.due(now, &config) {
                Some(c) => {
                    scheduler.mark_started(now);
                    c
                }
                None => continue,
            }
        };

        if let Err(e) = state.run_analysis(cadence).await {
            error!(error = %e, "analysis run failed");
        }
        state.scheduler.lock().await.mark_finished();
    }
}

/// Whether the pool refresh should sweep now: always during the session,
/// and off hours until a first universe snapshot exists, so breadth after
/// a restart is computed over real data rather than an empty cache.
fn universe_refresh_due(trading: bool, universe_empty: bool) -> bool {
    trading || universe_empty
}

async fn pool_refresh_loop(state: Arc<MonitorState>) {
    loop {
        let trading = calendar::is_trading_time(Local::now());
        let universe_empty = state.universe.read().await.is_empty();
        if !universe_refresh_due(trading, universe_empty) {
            tokio::time::sleep(OFF_HOURS_IDLE).await;
            continue;
        }

        match state.resolver.fetch_universe().await {
            Ok(universe) => {
                let mut pools = scan::derive_pools(&universe);
                *state.universe.write().await = universe;
                for entry in state.pending_seals.lock().await.drain(..) {
                    pools.absorb_seal(entry);
                }
                pools.inherit_metrics(&*state.pools.read().await);
                state.enrich_pool_metrics(&mut pools).await;
                if let Err(e) = state.store.save_pools(&pools) {
                    warn!(error = %e, "pool persist failed");
                }
                *state.pools.write().await = pools;
            }
            Err(e) => {
                // Keep the last good snapshot on vendor failure
                warn!(error = %e, "universe refresh failed");
            }
        }
        let idle = if trading { POOL_REFRESH_INTERVAL } else { OFF_HOURS_IDLE };
        tokio::time::sleep(idle).await;
    }
}

async fn intraday_scan_loop(state: Arc<MonitorState>) {
    loop {
        tokio::time::sleep(INTRADAY_SCAN_INTERVAL).await;
        if !calendar::is_trading_time(Local::now()) {
            continue;
        }

        let universe = state.universe.read().await.clone();
        if universe.is_empty() {
            continue;
        }
        let candidates = scan::scan_intraday(&universe);
        *state.intraday.write().await = candidates;

        // Stage seals spotted between pool refreshes. The refresh loop is
        // the pools' only writer and folds these in on its next pass.
        let sealed: Vec<PoolEntry> = universe
            .iter()
            .filter(|s| {
                market::classify(s, market::BoardType::from_code(&s.code))
                    == market::LimitState::Sealed
            })
            .map(|snap| PoolEntry {
                code: snap.code.clone(),
                name: snap.name.clone(),
                current: snap.current,
                change_percent: snap.change_percent,
                turnover: snap.turnover,
                seal_time: "-".to_string(),
                reason: "sealed at the limit".to_string(),
                metrics: metrics::MetricsBlock::default(),
            })
            .collect();
        if !sealed.is_empty() {
            state.pending_seals.lock().await.extend(sealed);
        }
    }
}

async fn watch_quote_loop(state: Arc<MonitorState>) {
    loop {
        tokio::time::sleep(WATCH_QUOTE_INTERVAL).await;
        if !calendar::is_trading_time(Local::now()) {
            continue;
        }

        let codes: Vec<String> = state
            .watchlist
            .read()
            .await
            .iter()
            .map(|e| e.code.clone())
            .collect();
        if codes.is_empty() {
            continue;
        }

        match state.resolver.fetch_codes(&codes).await {
            Ok(quotes) => {
                let mut map = state.watch_quotes.write().await;
                for snap in quotes {
                    map.insert(snap.code.clone(), snap);
                }
            }
            Err(e) => {
                warn!(error = %e, "watchlist quote refresh failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_universe_refresh_due_off_hours_only_when_empty() {
        // During the session the sweep always runs
        assert!(universe_refresh_due(true, false));
        assert!(universe_refresh_due(true, true));
        // Off hours it runs once to seed the cache, then idles
        assert!(universe_refresh_due(false, true));
        assert!(!universe_refresh_due(false, false));
    }
}
