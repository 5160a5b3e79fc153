//! Market endpoints: listing, creation, stats, price history.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AdminKey;
use crate::error::ApiError;
use crate::models::market::Market;
use crate::services::pricing;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateMarketRequest {
    pub question: String,
    pub creator: String,
    pub condition_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveMarketRequest {
    pub outcome: i32,
}

#[derive(Debug, Deserialize)]
pub struct PriceHistoryQuery {
    /// Bucket width in seconds
    pub interval: Option<u64>,
    pub limit: Option<usize>,
}

/// One OHLC bucket of YES-side prices.
#[derive(Debug, Serialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub volume: i64,
}

/// GET /api/markets
pub async fn list_markets(State(state): State<Arc<AppState>>) -> Json<Value> {
    let markets = state.markets.all_markets();
    Json(json!({ "success": true, "markets": markets }))
}

/// GET /api/markets/:market_id
pub async fn get_market(
    State(state): State<Arc<AppState>>,
    Path(market_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let market = require_market(&state, market_id)?;
    Ok(Json(json!({ "success": true, "market": market })))
}

/// POST /api/markets (admin)
pub async fn create_market(
    _admin: AdminKey,
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateMarketRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.question.trim().is_empty() {
        return Err(ApiError::InvalidArgument("question must not be empty".into()));
    }
    let market = Market::new(&request.condition_id, &request.question, &request.creator)
        .map_err(ApiError::InvalidArgument)?;
    let market = state.markets.add_market(market).await?;
    tracing::info!("market {} created by {}", market.market_id, market.creator);
    Ok(Json(json!({ "success": true, "market": market })))
}

/// POST /api/markets/:market_id/resolve (admin)
pub async fn resolve_market(
    _admin: AdminKey,
    State(state): State<Arc<AppState>>,
    Path(market_id): Path<Uuid>,
    Json(request): Json<ResolveMarketRequest>,
) -> Result<Json<Value>, ApiError> {
    if !(0..=1).contains(&request.outcome) {
        return Err(ApiError::InvalidArgument("outcome must be 0 or 1".into()));
    }
    require_market(&state, market_id)?;
    let market = state.markets.resolve_market(market_id, request.outcome).await?;
    Ok(Json(json!({ "success": true, "market": market })))
}

/// GET /api/markets/:market_id/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(market_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let market = require_market(&state, market_id)?;
    let orders = state.orders.get_market_orders(market_id);
    let open_orders = orders.iter().filter(|o| o.status.is_resting()).count();
    let trade_count = state.trades.count(market_id);
    let last_trade = state
        .trades
        .recent(market_id, 1)
        .into_iter()
        .next()
        .map(|trade| yes_price_of(&market, trade.outcome_position_id.as_str(), trade.price));

    Ok(Json(json!({
        "success": true,
        "market_id": market_id,
        "order_count": orders.len(),
        "open_order_count": open_orders,
        "trade_count": trade_count,
        "yes_price": market.yes_price,
        "no_price": market.no_price,
        "volume_24h": market.volume_24h,
        "last_trade_price": last_trade,
    })))
}

/// GET /api/markets/:market_id/price-history?interval&limit
pub async fn get_price_history(
    State(state): State<Arc<AppState>>,
    Path(market_id): Path<Uuid>,
    Query(query): Query<PriceHistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let market = require_market(&state, market_id)?;
    let interval_ms = query.interval.unwrap_or(3600).max(1) as i64 * 1000;
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);

    let mut candles: Vec<Candle> = Vec::new();
    for trade in state.trades.for_market(market_id) {
        let bucket = trade.timestamp - trade.timestamp.rem_euclid(interval_ms);
        let price = yes_price_of(&market, trade.outcome_position_id.as_str(), trade.price);
        match candles.last_mut() {
            Some(candle) if candle.timestamp == bucket => {
                candle.high = candle.high.max(price);
                candle.low = candle.low.min(price);
                candle.close = price;
                candle.volume += trade.size;
            }
            _ => candles.push(Candle {
                timestamp: bucket,
                open: price,
                high: price,
                low: price,
                close: price,
                volume: trade.size,
            }),
        }
    }
    let candles: Vec<Candle> = candles.into_iter().rev().take(limit).collect();

    Ok(Json(json!({
        "success": true,
        "market_id": market_id,
        "interval": interval_ms / 1000,
        "candles": candles,
    })))
}

pub(crate) fn require_market(state: &AppState, market_id: Uuid) -> Result<Market, ApiError> {
    state
        .markets
        .get_market(market_id)
        .ok_or_else(|| ApiError::NotFound(format!("market {}", market_id)))
}

/// Normalize a trade price into YES terms.
pub(crate) fn yes_price_of(market: &Market, outcome_position_id: &str, price: i64) -> i64 {
    if outcome_position_id == market.yes_position_id {
        price
    } else {
        pricing::complement(price)
    }
}
