//! Admin endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AdminKey;
use crate::error::ApiError;
use crate::services::settlement::{SettlementError, SettlementRequest};
use crate::AppState;

/// POST /api/admin/settlements/:trade_id
///
/// Re-drive settlement for a recorded trade. Refused when the trade
/// already carries a transaction id.
pub async fn force_settle(
    _admin: AdminKey,
    State(state): State<Arc<AppState>>,
    Path(trade_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let settlement = state
        .settlement
        .as_ref()
        .ok_or(SettlementError::Disabled)?;

    let trade = state
        .trades
        .get(trade_id)
        .ok_or_else(|| ApiError::NotFound(format!("trade {}", trade_id)))?;
    let maker_order = state
        .orders
        .get_order(trade.maker_order_id)
        .ok_or_else(|| ApiError::NotFound(format!("order {}", trade.maker_order_id)))?;
    let taker_order = state
        .orders
        .get_order(trade.taker_order_id)
        .ok_or_else(|| ApiError::NotFound(format!("order {}", trade.taker_order_id)))?;

    let fill_amount = trade.size;
    let tx_hash = settlement
        .settle_and_record(&SettlementRequest {
            trade,
            maker_order,
            taker_order,
            fill_amount,
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "trade_id": trade_id,
        "tx_hash": tx_hash,
    })))
}
