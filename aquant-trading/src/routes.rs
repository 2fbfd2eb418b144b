//! HTTP routes for the dashboard.

use aquant_common::config::Config;
use aquant_common::Error;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

use crate::market::{LadderEntry, MarketPhase, MarketSentiment, SectorHeat};
use crate::monitor::{MarketMonitor, MonitorStatus};
use crate::strategy::Decision;
use crate::watchlist::WatchlistItem;

const DEFAULT_DECISION_LIMIT: usize = 50;
const MAX_DECISION_LIMIT: usize = 500;

/// Shared state for route handlers.
pub struct AppState {
    pub config: Config,
    pub monitor: Arc<MarketMonitor>,
}

impl AppState {
    pub fn new(config: Config, monitor: Arc<MarketMonitor>) -> Self {
        Self { config, monitor }
    }
}

// ============================================================================
// Error Mapping
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// [`aquant_common::Error`] as an HTTP response.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self(Error::Storage(format!("{:#}", e)))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        }
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

#[derive(Debug, Serialize)]
pub struct MarketResponse {
    /// False until the first cycle has run
    pub ready: bool,
    pub timestamp: Option<String>,
    pub sentiment: Option<MarketSentiment>,
    pub phase: Option<MarketPhase>,
    pub phase_label: Option<String>,
    pub position_multiplier: Option<f64>,
    pub top_sectors: Vec<SectorHeat>,
    pub hot_sectors: Vec<String>,
    pub ladder: Vec<LadderEntry>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionsQuery {
    pub limit: Option<usize>,
    pub symbol: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DecisionsResponse {
    pub decisions: Vec<Decision>,
    pub count: usize,
    /// "journal" or "memory"
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct WatchlistResponse {
    pub items: Vec<WatchlistItem>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct AddWatchlistRequest {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "aquant-trading".to_string(),
    })
}

/// Sentiment, cycle phase and top sectors from the latest cycle
pub async fn get_market(State(state): State<Arc<AppState>>) -> Json<MarketResponse> {
    let response = match state.monitor.market().await {
        Some(view) => MarketResponse {
            ready: true,
            timestamp: Some(view.timestamp.to_rfc3339()),
            phase_label: Some(view.phase.to_string()),
            phase: Some(view.phase),
            position_multiplier: Some(view.position_multiplier),
            sentiment: Some(view.sentiment),
            top_sectors: view.top_sectors,
            hot_sectors: view.hot_sectors,
            ladder: view.ladder,
        },
        None => MarketResponse {
            ready: false,
            timestamp: None,
            sentiment: None,
            phase: None,
            phase_label: None,
            position_multiplier: None,
            top_sectors: Vec::new(),
            hot_sectors: Vec::new(),
            ladder: Vec::new(),
        },
    };
    Json(response)
}

/// Recent decisions, newest first
pub async fn get_decisions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DecisionsQuery>,
) -> ApiResult<Json<DecisionsResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_DECISION_LIMIT)
        .clamp(1, MAX_DECISION_LIMIT);

    let (decisions, source) = match state.monitor.journal() {
        Some(journal) => {
            let decisions = match query.symbol.as_deref() {
                Some(symbol) => journal.for_symbol(symbol, limit).await?,
                None => journal.recent(limit).await?,
            };
            (decisions, "journal")
        }
        None => {
            let mut decisions = state.monitor.recent_decisions(MAX_DECISION_LIMIT).await;
            if let Some(symbol) = query.symbol.as_deref() {
                decisions.retain(|d| d.symbol == symbol);
            }
            decisions.truncate(limit);
            (decisions, "memory")
        }
    };

    Ok(Json(DecisionsResponse {
        count: decisions.len(),
        decisions,
        source: source.to_string(),
    }))
}

/// Current watchlist
pub async fn get_watchlist(State(state): State<Arc<AppState>>) -> Json<WatchlistResponse> {
    let watchlist = state.monitor.watchlist();
    let list = watchlist.read().await;
    Json(WatchlistResponse {
        items: list.items().to_vec(),
        count: list.len(),
    })
}

/// Add (or replace) a watchlist entry
pub async fn add_watchlist(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddWatchlistRequest>,
) -> ApiResult<(StatusCode, Json<WatchlistItem>)> {
    let symbol = req.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(Error::InvalidInput("symbol must not be empty".into()).into());
    }

    let item = WatchlistItem {
        symbol,
        name: req.name,
        reason: req.reason,
        tags: req.tags,
        added_at: Utc::now(),
    };

    let watchlist = state.monitor.watchlist();
    let mut list = watchlist.write().await;
    list.add(item.clone());
    list.save()?;

    info!(symbol = %item.symbol, "Added to watchlist");
    Ok((StatusCode::CREATED, Json(item)))
}

/// Remove a watchlist entry
pub async fn remove_watchlist(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> ApiResult<StatusCode> {
    let watchlist = state.monitor.watchlist();
    let mut list = watchlist.write().await;
    if !list.remove(&symbol) {
        return Err(Error::NotFound(format!("{} is not on the watchlist", symbol)).into());
    }
    list.save()?;

    info!(symbol = %symbol, "Removed from watchlist");
    Ok(StatusCode::NO_CONTENT)
}

/// Monitor state and counters
pub async fn get_monitor_status(State(state): State<Arc<AppState>>) -> Json<MonitorStatus> {
    Json(state.monitor.status().await)
}

// ============================================================================
// Router
// ============================================================================

/// Build the API router with CORS and a request timeout.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs.max(1));

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/market", get(get_market))
        .route("/api/v1/decisions", get(get_decisions))
        .route("/api/v1/watchlist", get(get_watchlist).post(add_watchlist))
        .route("/api/v1/watchlist/:symbol", delete(remove_watchlist))
        .route("/api/v1/monitor/status", get(get_monitor_status))
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
}
