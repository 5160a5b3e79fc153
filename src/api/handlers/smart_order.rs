//! Order placement: previews, smart (limit/market) orders, requirements,
//! and per-order reads and cancels.

use axum::extract::{Path, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::chain::hashing::{order_hash, verify_order_signature, OrderHashInput};
use crate::error::ApiError;
use crate::models::market::Market;
use crate::models::order::{NewOrder, Order, OrderSide, OrderType};
use crate::services::router::{plan_execution, ExecutionPlan, PlanRequest};
use crate::AppState;

use super::market::require_market;

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub market_id: Uuid,
    /// Outcome index: 0 = YES, 1 = NO
    pub outcome: u8,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub size: i64,
    pub limit_price: Option<i64>,
    pub max_slippage: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub maker: String,
    pub market_id: Uuid,
    pub outcome: u8,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Option<i64>,
    pub size: i64,
    #[serde(default)]
    pub salt: Option<String>,
    #[serde(default)]
    pub expiration: i64,
    /// Counterparty principal bound into the signed hash; defaults to the
    /// maker itself for open orders.
    #[serde(default)]
    pub taker: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
    pub max_slippage: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct RequirementsRequest {
    pub maker: String,
    pub market_id: Uuid,
    pub side: OrderSide,
    pub outcome: u8,
    pub size: i64,
}

/// POST /api/smart-orders/preview
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<Value>, ApiError> {
    let market = require_market(&state, request.market_id)?;
    let outcome_position = outcome_position(&market, request.outcome)?;
    validate_size(request.size)?;

    let book = state.orders.get_orderbook(market.market_id, outcome_position);
    let plan = plan_execution(
        &book,
        &PlanRequest {
            side: request.side,
            order_type: request.order_type,
            size: request.size,
            limit_price: request.limit_price,
            max_slippage: request.max_slippage,
        },
    );
    Ok(Json(json!({ "success": true, "plan": plan })))
}

/// POST /api/smart-orders
///
/// LIMIT: verify and accept one resting order. MARKET: plan the sweep and
/// place one marketable order per feasible level.
pub async fn place(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<Json<Value>, ApiError> {
    let market = require_market(&state, request.market_id)?;
    if market.resolved {
        return Err(ApiError::Conflict(format!(
            "market {} is resolved",
            market.market_id
        )));
    }
    validate_size(request.size)?;

    match request.order_type {
        OrderType::Limit => {
            let price = request
                .price
                .ok_or_else(|| ApiError::InvalidArgument("limit orders require a price".into()))?;
            let order = place_limit(&state, &market, &request, price).await?;
            Ok(Json(json!({ "success": true, "order": order })))
        }
        OrderType::Market => {
            let (plan, orders) = place_market(&state, &market, &request).await?;
            Ok(Json(json!({ "success": true, "plan": plan, "orders": orders })))
        }
    }
}

async fn place_limit(
    state: &AppState,
    market: &Market,
    request: &PlaceOrderRequest,
    price: i64,
) -> Result<Order, ApiError> {
    let (maker_position, taker_position) =
        position_pair(market, request.outcome, request.side)?;
    let salt = match &request.salt {
        Some(salt) => salt.clone(),
        None => generated_salt(),
    };

    if request.signature.is_some() != request.public_key.is_some() {
        return Err(ApiError::InvalidArgument(
            "signature and public key must be supplied together".into(),
        ));
    }
    if let (Some(signature), Some(public_key)) = (&request.signature, &request.public_key) {
        let maker_position_bytes = hex::decode(&maker_position)
            .map_err(|_| ApiError::InvalidArgument("maker position id is not hex".into()))?;
        let taker_position_bytes = hex::decode(&taker_position)
            .map_err(|_| ApiError::InvalidArgument("taker position id is not hex".into()))?;
        let taker_amount = (price as i128 * request.size as i128) as u128;
        let digest = order_hash(&OrderHashInput {
            maker: &request.maker,
            taker: request.taker.as_deref().unwrap_or(&request.maker),
            maker_position_id: &maker_position_bytes,
            taker_position_id: &taker_position_bytes,
            maker_amount: request.size as u128,
            taker_amount,
            salt: &salt,
            expiration: request.expiration.max(0) as u64,
        })?;
        verify_order_signature(&digest, signature, public_key)?;
    }

    let order = state
        .orders
        .add_order(
            market,
            NewOrder {
                maker: request.maker.clone(),
                market_id: market.market_id,
                condition_id: market.condition_id.clone(),
                maker_position_id: maker_position,
                taker_position_id: taker_position,
                side: request.side,
                price,
                size: request.size,
                salt,
                expiration: request.expiration,
                signature: request.signature.clone(),
                public_key: request.public_key.clone(),
            },
        )
        .await?;
    Ok(order)
}

async fn place_market(
    state: &AppState,
    market: &Market,
    request: &PlaceOrderRequest,
) -> Result<(ExecutionPlan, Vec<Order>), ApiError> {
    let outcome_position = outcome_position(market, request.outcome)?;
    let book = state.orders.get_orderbook(market.market_id, outcome_position);
    let plan = plan_execution(
        &book,
        &PlanRequest {
            side: request.side,
            order_type: OrderType::Market,
            size: request.size,
            limit_price: None,
            max_slippage: request.max_slippage,
        },
    );
    if !plan.feasible {
        return Err(ApiError::PlanRejected {
            reason: plan
                .reason
                .clone()
                .unwrap_or_else(|| "plan not feasible".into()),
            plan: Box::new(plan),
        });
    }

    let (maker_position, taker_position) =
        position_pair(market, request.outcome, request.side)?;
    let mut orders = Vec::with_capacity(plan.levels.len());
    for level in &plan.levels {
        let order = state
            .orders
            .add_order(
                market,
                NewOrder {
                    maker: request.maker.clone(),
                    market_id: market.market_id,
                    condition_id: market.condition_id.clone(),
                    maker_position_id: maker_position.clone(),
                    taker_position_id: taker_position.clone(),
                    side: request.side,
                    price: level.price,
                    size: level.size,
                    salt: generated_salt(),
                    expiration: request.expiration,
                    signature: None,
                    public_key: None,
                },
            )
            .await?;
        orders.push(order);
    }
    Ok((plan, orders))
}

/// POST /api/smart-orders/requirements
///
/// Which position the maker surrenders for this order shape.
pub async fn requirements(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RequirementsRequest>,
) -> Result<Json<Value>, ApiError> {
    let market = require_market(&state, request.market_id)?;
    validate_size(request.size)?;
    let (maker_position, taker_position) =
        position_pair(&market, request.outcome, request.side)?;

    Ok(Json(json!({
        "success": true,
        "maker": request.maker,
        "market_id": market.market_id,
        "required_position_id": maker_position,
        "required_amount": request.size,
        "receives_position_id": taker_position,
    })))
}

/// GET /api/orders/:order_id
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let order = state
        .orders
        .get_order(order_id)
        .ok_or_else(|| ApiError::NotFound(format!("order {}", order_id)))?;
    Ok(Json(json!({ "success": true, "order": order })))
}

/// DELETE /api/orders/:order_id
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let order = state
        .orders
        .get_order(order_id)
        .ok_or_else(|| ApiError::NotFound(format!("order {}", order_id)))?;
    if order.status.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "order {} is already {}",
            order_id, order.status
        )));
    }
    if !state.orders.cancel_order(order_id).await {
        return Err(ApiError::Conflict(format!(
            "order {} could not be cancelled",
            order_id
        )));
    }
    let order = state.orders.get_order(order_id);
    Ok(Json(json!({ "success": true, "order": order })))
}

/// GET /api/users/:principal/orders
pub async fn get_user_orders(
    State(state): State<Arc<AppState>>,
    Path(principal): Path<String>,
) -> Json<Value> {
    let orders = state.orders.get_user_orders(&principal);
    Json(json!({ "success": true, "orders": orders }))
}

fn outcome_position(market: &Market, outcome: u8) -> Result<&str, ApiError> {
    match outcome {
        0 => Ok(&market.yes_position_id),
        1 => Ok(&market.no_position_id),
        other => Err(ApiError::InvalidArgument(format!(
            "outcome must be 0 or 1, got {}",
            other
        ))),
    }
}

fn position_pair(
    market: &Market,
    outcome: u8,
    side: OrderSide,
) -> Result<(String, String), ApiError> {
    let outcome_pos = outcome_position(market, outcome)?.to_string();
    let complement = market
        .complement_of(&outcome_pos)
        .ok_or_else(|| ApiError::Internal("market positions are inconsistent".into()))?
        .to_string();
    Ok(match side {
        OrderSide::Buy => (complement, outcome_pos),
        OrderSide::Sell => (outcome_pos, complement),
    })
}

fn validate_size(size: i64) -> Result<(), ApiError> {
    if size < 1 {
        return Err(ApiError::InvalidArgument("size must be at least 1".into()));
    }
    Ok(())
}

fn generated_salt() -> String {
    Uuid::new_v4().as_u128().to_string()
}
