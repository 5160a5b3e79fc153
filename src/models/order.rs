//! Order model.
//!
//! Orders are token-for-token swaps: `maker_position_id` is what the maker
//! surrenders, `taker_position_id` is what the maker receives. For outcome O,
//! BUY O surrenders the complement and receives O; SELL O is the reverse.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::services::pricing::PRICE_SCALE;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for OrderSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            _ => Err(format!("invalid order side: {}", s)),
        }
    }
}

/// Order type. Limit orders rest; market orders are planned by the smart
/// router and never rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Market => write!(f, "MARKET"),
        }
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    /// Resting orders are present in the price-sorted book.
    pub fn is_resting(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    /// Terminal states are absorbing; no further transitions allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Expired
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Open => "OPEN",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Expired => "EXPIRED",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OPEN" => Ok(OrderStatus::Open),
            "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
            "FILLED" => Ok(OrderStatus::Filled),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "EXPIRED" => Ok(OrderStatus::Expired),
            _ => Err(format!("invalid order status: {}", s)),
        }
    }
}

/// A resting or historical order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Order ID, allocated on acceptance
    pub order_id: Uuid,

    /// Maker principal
    pub maker: String,

    /// Market ID
    pub market_id: Uuid,

    /// On-chain condition id (32 bytes, hex)
    pub condition_id: String,

    /// Position the maker surrenders (32 bytes, hex)
    pub maker_position_id: String,

    /// Position the maker receives (32 bytes, hex)
    pub taker_position_id: String,

    /// Order side
    pub side: OrderSide,

    /// Limit price in micro-sats per token
    pub price: i64,

    /// Total size in token units
    pub size: i64,

    /// Filled size in token units
    pub filled_size: i64,

    /// Remaining size in token units
    pub remaining_size: i64,

    /// Order status
    pub status: OrderStatus,

    /// Numeric salt carried into the order hash
    pub salt: String,

    /// Expiration block height, 0 = never
    pub expiration: i64,

    /// Creation timestamp (ms)
    pub created_at: i64,

    /// Last update timestamp (ms)
    pub updated_at: i64,

    /// RSV signature over the order hash (130 hex chars)
    pub signature: Option<String>,

    /// Compressed public key the signature verifies against
    pub public_key: Option<String>,
}

/// Input to order acceptance; the store allocates the id and fill state.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub maker: String,
    pub market_id: Uuid,
    pub condition_id: String,
    pub maker_position_id: String,
    pub taker_position_id: String,
    pub side: OrderSide,
    pub price: i64,
    pub size: i64,
    pub salt: String,
    #[serde(default)]
    pub expiration: i64,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
}

impl Order {
    /// Materialize an accepted order from validated input.
    pub fn accept(input: NewOrder) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            order_id: Uuid::new_v4(),
            maker: input.maker,
            market_id: input.market_id,
            condition_id: input.condition_id.to_lowercase(),
            maker_position_id: input.maker_position_id.to_lowercase(),
            taker_position_id: input.taker_position_id.to_lowercase(),
            side: input.side,
            price: input.price,
            size: input.size,
            filled_size: 0,
            remaining_size: input.size,
            status: OrderStatus::Open,
            salt: input.salt,
            expiration: input.expiration,
            created_at: now,
            updated_at: now,
            signature: input.signature,
            public_key: input.public_key,
        }
    }

    /// The outcome token this order's book is about: what a buyer receives,
    /// what a seller surrenders.
    pub fn book_position_id(&self) -> &str {
        match self.side {
            OrderSide::Buy => &self.taker_position_id,
            OrderSide::Sell => &self.maker_position_id,
        }
    }

    /// Whether the order is past its expiration at `height`. Expiration 0
    /// never expires.
    pub fn is_expired_at(&self, height: u64) -> bool {
        self.expiration > 0 && (self.expiration as u64) < height
    }

    /// Validate the acceptance invariants for a fresh order.
    pub fn validate_new(input: &NewOrder) -> Result<(), String> {
        if input.size < 1 {
            return Err("size must be at least 1".into());
        }
        if input.price <= 0 || input.price >= PRICE_SCALE {
            return Err(format!(
                "price must be strictly between 0 and {}",
                PRICE_SCALE
            ));
        }
        if input.maker_position_id.eq_ignore_ascii_case(&input.taker_position_id) {
            return Err("maker and taker position ids must differ".into());
        }
        for (label, id) in [
            ("maker_position_id", &input.maker_position_id),
            ("taker_position_id", &input.taker_position_id),
        ] {
            match hex::decode(id) {
                Ok(bytes) if bytes.len() == 32 => {}
                _ => return Err(format!("{} must be 32 bytes of hex", label)),
            }
        }
        if input.salt.is_empty() || !input.salt.bytes().all(|b| b.is_ascii_digit()) {
            return Err("salt must be a numeric string".into());
        }
        if input.expiration < 0 {
            return Err("expiration must be non-negative".into());
        }
        Ok(())
    }
}
