//! Trade records produced by the matching engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::order::OrderSide;

/// How a matched pair settles on-chain.
///
/// NORMAL swaps one outcome token against the other. MINT pairs two buyers
/// whose prices sum to the collateral value and mints a fresh YES+NO pair.
/// MERGE pairs two sellers and burns a YES+NO pair back to collateral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeType {
    Normal,
    Mint,
    Merge,
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeType::Normal => write!(f, "NORMAL"),
            TradeType::Mint => write!(f, "MINT"),
            TradeType::Merge => write!(f, "MERGE"),
        }
    }
}

/// An executed match between two orders. Immutable once created except for
/// the settlement transaction id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Trade ID
    pub trade_id: Uuid,

    /// Market ID
    pub market_id: Uuid,

    /// Condition id of the market (hex)
    pub condition_id: String,

    /// The outcome token of the book the pair crossed in; `price` is in
    /// this token's terms
    pub outcome_position_id: String,

    /// Maker order's surrendered position (hex)
    pub maker_position_id: String,

    /// Maker order's received position (hex)
    pub taker_position_id: String,

    /// Maker principal (resting side)
    pub maker: String,

    /// Taker principal (incoming side)
    pub taker: String,

    /// Execution price in micro-sats, in the matched book's outcome terms
    pub price: i64,

    /// Fill size in token units
    pub size: i64,

    /// Taker's side
    pub side: OrderSide,

    /// Resting order id
    pub maker_order_id: Uuid,

    /// Crossing order id
    pub taker_order_id: Uuid,

    /// Settlement classification
    pub trade_type: TradeType,

    /// Execution timestamp (ms)
    pub timestamp: i64,

    /// On-chain settlement transaction id, once broadcast
    pub tx_hash: Option<String>,
}
