//! Market model.
//!
//! A market is one binary condition with two outcome tokens (YES and NO)
//! whose position ids derive from the on-chain condition id.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::hashing::derive_position_id;
use crate::services::pricing::PRICE_SCALE;

/// A binary prediction market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Market ID
    pub market_id: Uuid,

    /// On-chain condition id (32 bytes, lowercase hex)
    pub condition_id: String,

    /// Market question
    pub question: String,

    /// Creator principal
    pub creator: String,

    /// YES outcome position id (32 bytes, lowercase hex)
    pub yes_position_id: String,

    /// NO outcome position id (32 bytes, lowercase hex)
    pub no_position_id: String,

    /// YES price in micro-sats, yes + no = PRICE_SCALE
    pub yes_price: i64,

    /// NO price in micro-sats
    pub no_price: i64,

    /// 24h traded volume in token units
    pub volume_24h: i64,

    /// Creation timestamp (ms)
    pub created_at: i64,

    /// Whether the market has been resolved
    pub resolved: bool,

    /// Winning outcome index (0 = YES, 1 = NO) once resolved
    pub outcome: Option<i32>,
}

impl Market {
    /// Create a new market, deriving both outcome position ids from the
    /// condition id. Prices start at an even split.
    pub fn new(condition_id: &str, question: &str, creator: &str) -> Result<Self, String> {
        let condition = hex::decode(condition_id)
            .map_err(|_| format!("condition id is not hex: {}", condition_id))?;
        if condition.len() != 32 {
            return Err(format!(
                "condition id must be 32 bytes, got {}",
                condition.len()
            ));
        }
        let condition: [u8; 32] = condition
            .try_into()
            .map_err(|_| "condition id must be 32 bytes".to_string())?;

        Ok(Self {
            market_id: Uuid::new_v4(),
            condition_id: condition_id.to_lowercase(),
            question: question.to_string(),
            creator: creator.to_string(),
            yes_position_id: hex::encode(derive_position_id(&condition, 0)),
            no_position_id: hex::encode(derive_position_id(&condition, 1)),
            yes_price: PRICE_SCALE / 2,
            no_price: PRICE_SCALE / 2,
            volume_24h: 0,
            created_at: Utc::now().timestamp_millis(),
            resolved: false,
            outcome: None,
        })
    }

    /// Both outcome position ids, YES first.
    pub fn position_ids(&self) -> [&str; 2] {
        [&self.yes_position_id, &self.no_position_id]
    }

    /// The complementary position id, or `None` if the id is not one of
    /// this market's outcomes.
    pub fn complement_of(&self, position_id: &str) -> Option<&str> {
        if position_id == self.yes_position_id {
            Some(&self.no_position_id)
        } else if position_id == self.no_position_id {
            Some(&self.yes_position_id)
        } else {
            None
        }
    }

    /// Whether `position_id` names one of this market's outcome tokens.
    pub fn has_position(&self, position_id: &str) -> bool {
        position_id == self.yes_position_id || position_id == self.no_position_id
    }
}
