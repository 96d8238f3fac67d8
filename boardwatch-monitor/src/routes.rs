//! HTTP surface of the monitor.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use boardwatch_common::Error;

use crate::market::{breadth, calendar, classify, BoardType, LimitState};
use crate::scheduler::{Cadence, ScanMode};
use crate::{MonitorState, INDEX_CODES};

type AppState = State<Arc<MonitorState>>;

pub fn router(state: Arc<MonitorState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stocks", get(list_stocks))
        .route("/api/limit_up_pool", get(limit_up_pool))
        .route("/api/intraday_pool", get(intraday_pool))
        .route("/api/market_sentiment", get(market_sentiment))
        .route("/api/market_status", get(market_status))
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/schedule", get(schedule))
        .route("/api/analyze", post(trigger_analysis))
        .route("/api/add_stock", post(add_stock))
        .route("/api/watchlist/remove", post(remove_stock))
        .route("/api/analyze_stock", post(analyze_stock))
        .layer(
            ServiceBuilder::new()
                .layer(RequestBodyLimitLayer::new(64 * 1024))
                .layer(TimeoutLayer::new(std::time::Duration::from_secs(60)))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn error_response(e: Error) -> Response {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// ============================================================================
// Watchlist
// ============================================================================

/// Watchlist entry joined with its live quote.
#[derive(Serialize)]
struct StockView {
    #[serde(flatten)]
    entry: crate::watchlist::WatchEntry,
    current: Option<f64>,
    change_percent: Option<f64>,
    limit_state: Option<LimitState>,
}

async fn list_stocks(State(state): AppState) -> impl IntoResponse {
    let entries = state.watchlist.read().await.clone();
    let quotes = state.watch_quotes.read().await;

    let stocks: Vec<StockView> = entries
        .into_iter()
        .map(|entry| {
            let quote = quotes.get(&entry.code);
            StockView {
                current: quote.map(|q| q.current),
                change_percent: quote.map(|q| q.change_percent),
                limit_state: quote.map(|q| classify(q, BoardType::from_code(&entry.code))),
                entry,
            }
        })
        .collect();
    Json(json!({ "stocks": stocks }))
}

#[derive(Deserialize)]
struct CodeBody {
    code: String,
}

#[derive(Deserialize)]
struct CodeQuery {
    code: String,
}

async fn add_stock(State(state): AppState, Query(query): Query<CodeQuery>) -> Response {
    match state.add_manual(&query.code).await {
        Ok(entry) => {
            info!(code = %entry.code, "manual watchlist add");
            Json(json!({ "added": entry })).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn remove_stock(State(state): AppState, Json(body): Json<CodeBody>) -> Response {
    match state.remove_entry(&body.code).await {
        Ok(()) => {
            info!(code = %body.code, "watchlist remove");
            Json(json!({ "removed": body.code })).into_response()
        }
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Pools
// ============================================================================

async fn limit_up_pool(State(state): AppState) -> impl IntoResponse {
    let pools = state.pools.read().await.clone();
    Json(pools)
}

async fn intraday_pool(State(state): AppState) -> impl IntoResponse {
    let candidates = state.intraday.read().await.clone();
    Json(json!({ "candidates": candidates }))
}

// ============================================================================
// Market overview
// ============================================================================

async fn market_sentiment(State(state): AppState) -> Response {
    let index_codes: Vec<String> = INDEX_CODES.iter().map(|s| s.to_string()).collect();
    let indices = match state.resolver.fetch_indices(&index_codes).await {
        Ok(quotes) => quotes,
        Err(e) => return error_response(e.into()),
    };

    let universe = state.universe.read().await;
    let stats = breadth::compute_breadth(&universe);
    drop(universe);

    let total_amount = breadth::total_amount(&indices);
    let benchmark = indices.iter().find(|q| q.code == INDEX_CODES[0]);
    let sentiment = breadth::derive_sentiment(&stats, benchmark, total_amount);

    Json(breadth::MarketOverview {
        indices,
        stats,
        total_amount,
        sentiment,
        suggestion: sentiment.suggestion().to_string(),
    })
    .into_response()
}

async fn market_status() -> impl IntoResponse {
    let now = Local::now();
    Json(json!({
        "is_trading_day": calendar::is_trading_day(now),
        "is_trading_time": calendar::is_trading_time(now),
        "message": calendar::session_message(now),
    }))
}

// ============================================================================
// Config
// ============================================================================

async fn get_config(State(state): AppState) -> impl IntoResponse {
    let config = state.config.read().await;
    Json(config.monitor.clone())
}

#[derive(Deserialize)]
struct ConfigPatch {
    auto_analysis_enabled: Option<bool>,
    use_smart_schedule: Option<bool>,
    fixed_interval_minutes: Option<u64>,
    annotator_url: Option<String>,
}

async fn update_config(State(state): AppState, Json(patch): Json<ConfigPatch>) -> Response {
    let mut config = state.config.write().await;
    if let Some(v) = patch.auto_analysis_enabled {
        config.monitor.auto_analysis_enabled = v;
    }
    if let Some(v) = patch.use_smart_schedule {
        config.monitor.use_smart_schedule = v;
    }
    if let Some(v) = patch.fixed_interval_minutes {
        config.monitor.fixed_interval_minutes = v.max(1);
    }
    if let Some(v) = patch.annotator_url {
        config.monitor.annotator_url = if v.is_empty() { None } else { Some(v) };
    }

    if let Err(e) = config.save() {
        return error_response(Error::Storage(e.to_string()));
    }
    info!("config updated");
    Json(config.monitor.clone()).into_response()
}

// ============================================================================
// Scheduling and analysis
// ============================================================================

async fn schedule(State(state): AppState) -> impl IntoResponse {
    let config = state.config.read().await.monitor.clone();
    let view = state.scheduler.lock().await.view(Local::now(), &config);
    Json(view)
}

#[derive(Deserialize)]
struct AnalyzeQuery {
    mode: Option<String>,
}

async fn trigger_analysis(State(state): AppState, Query(query): Query<AnalyzeQuery>) -> Response {
    let mode = match query.mode.as_deref() {
        Some("intraday") => ScanMode::Intraday,
        Some("after_hours") | None => ScanMode::AfterHours,
        Some(other) => {
            return error_response(Error::InvalidInput(format!("unknown mode: {other}")))
        }
    };
    let cadence = Cadence {
        interval_secs: 0,
        lookback_hours: 1.0,
        mode,
    };

    match state.run_analysis(cadence).await {
        Ok(()) => Json(json!({ "status": "completed" })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn analyze_stock(State(state): AppState, Json(body): Json<CodeBody>) -> Response {
    match state.analyze_security(&body.code).await {
        Ok(content) => Json(json!({ "code": body.code, "content": content })).into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Tests
// ============================================================================
