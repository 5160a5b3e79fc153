//! Orderbook read endpoints: aggregated books, trades, prices.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::services::pricing;
use crate::AppState;

use super::market::require_market;

#[derive(Debug, Deserialize)]
pub struct OrderbookQuery {
    #[serde(alias = "positionId")]
    pub position_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    pub limit: Option<usize>,
}

/// GET /api/orderbook/:market_id?position_id
///
/// One aggregated book when a position id is given, otherwise both.
pub async fn get_orderbook(
    State(state): State<Arc<AppState>>,
    Path(market_id): Path<Uuid>,
    Query(query): Query<OrderbookQuery>,
) -> Result<Json<Value>, ApiError> {
    let market = require_market(&state, market_id)?;

    if let Some(position_id) = query.position_id {
        let position_id = position_id.to_lowercase();
        if !market.has_position(&position_id) {
            return Err(ApiError::InvalidArgument(format!(
                "position {} does not belong to market {}",
                position_id, market_id
            )));
        }
        let book = state.orders.get_orderbook(market_id, &position_id);
        return Ok(Json(json!({ "success": true, "orderbook": book })));
    }

    let yes = state.orders.get_orderbook(market_id, &market.yes_position_id);
    let no = state.orders.get_orderbook(market_id, &market.no_position_id);
    Ok(Json(json!({ "success": true, "yes": yes, "no": no })))
}

/// GET /api/orderbook/:market_id/trades?limit
pub async fn get_trades(
    State(state): State<Arc<AppState>>,
    Path(market_id): Path<Uuid>,
    Query(query): Query<TradesQuery>,
) -> Result<Json<Value>, ApiError> {
    require_market(&state, market_id)?;
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let trades = state.trades.recent(market_id, limit);
    Ok(Json(json!({ "success": true, "trades": trades })))
}

/// GET /api/orderbook/:market_id/price
///
/// Mid, best bid/ask (YES terms) and the market's current prices.
pub async fn get_price(
    State(state): State<Arc<AppState>>,
    Path(market_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let market = require_market(&state, market_id)?;
    let book = state.orders.get_orderbook(market_id, &market.yes_position_id);
    let best_bid = book.best_bid();
    let best_ask = book.best_ask();
    let midpoint = match (best_bid, best_ask) {
        (Some(bid), Some(ask)) => Some(pricing::midpoint(bid, ask)),
        _ => None,
    };
    let last_trade = state
        .trades
        .recent(market_id, 1)
        .into_iter()
        .next()
        .map(|trade| super::market::yes_price_of(&market, trade.outcome_position_id.as_str(), trade.price));

    Ok(Json(json!({
        "success": true,
        "market_id": market_id,
        "yes_price": market.yes_price,
        "no_price": market.no_price,
        "best_bid": best_bid,
        "best_ask": best_ask,
        "midpoint": midpoint,
        "last_trade_price": last_trade,
    })))
}
