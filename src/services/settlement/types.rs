//! Settlement types.

use thiserror::Error;
use uuid::Uuid;

use crate::chain::ChainError;
use crate::models::order::Order;
use crate::models::trade::Trade;

/// One unit of settlement work: a matched trade plus the two orders that
/// produced it.
#[derive(Debug, Clone)]
pub struct SettlementRequest {
    pub trade: Trade,
    pub maker_order: Order,
    pub taker_order: Order,
    pub fill_amount: i64,
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("settlement is disabled (missing contract or operator key)")]
    Disabled,

    #[error("settlement precondition failed: {0}")]
    Precondition(String),

    #[error("trade {0} already settled")]
    AlreadySettled(Uuid),

    #[error("trade {0} not found")]
    TradeNotFound(Uuid),

    #[error("settlement rejected by node: {0}")]
    Rejected(String),

    #[error("settlement timed out waiting for broadcast")]
    Timeout,

    #[error(transparent)]
    Chain(#[from] ChainError),
}
