//! In-memory trade log.
//!
//! Trades are indexed by id and kept in per-market arrival order. Records
//! are immutable apart from the settlement transaction id.

use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::models::trade::Trade;

#[derive(Default)]
pub struct TradeLog {
    trades: DashMap<Uuid, Trade>,
    by_market: DashMap<Uuid, RwLock<Vec<Uuid>>>,
}

impl TradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, trade: Trade) {
        self.by_market
            .entry(trade.market_id)
            .or_default()
            .write()
            .push(trade.trade_id);
        self.trades.insert(trade.trade_id, trade);
    }

    pub fn get(&self, trade_id: Uuid) -> Option<Trade> {
        self.trades.get(&trade_id).map(|t| t.clone())
    }

    /// Most recent trades for a market, newest first.
    pub fn recent(&self, market_id: Uuid, limit: usize) -> Vec<Trade> {
        let Some(ids) = self.by_market.get(&market_id) else {
            return Vec::new();
        };
        let ids = ids.read();
        ids.iter()
            .rev()
            .take(limit)
            .filter_map(|id| self.trades.get(id).map(|t| t.clone()))
            .collect()
    }

    /// All trades for a market in arrival order.
    pub fn for_market(&self, market_id: Uuid) -> Vec<Trade> {
        let Some(ids) = self.by_market.get(&market_id) else {
            return Vec::new();
        };
        let ids = ids.read();
        ids.iter()
            .filter_map(|id| self.trades.get(id).map(|t| t.clone()))
            .collect()
    }

    pub fn count(&self, market_id: Uuid) -> usize {
        self.by_market
            .get(&market_id)
            .map(|ids| ids.read().len())
            .unwrap_or(0)
    }

    /// Attach the settlement transaction id. Refuses to overwrite an
    /// existing hash; settlement is at-most-once per trade.
    pub fn set_tx_hash(&self, trade_id: Uuid, tx_hash: &str) -> bool {
        match self.trades.get_mut(&trade_id) {
            Some(mut trade) if trade.tx_hash.is_none() => {
                trade.tx_hash = Some(tx_hash.to_string());
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::OrderSide;
    use crate::models::trade::TradeType;
    use chrono::Utc;

    fn sample_trade(market_id: Uuid) -> Trade {
        Trade {
            trade_id: Uuid::new_v4(),
            market_id,
            condition_id: hex::encode([9u8; 32]),
            outcome_position_id: hex::encode([1u8; 32]),
            maker_position_id: hex::encode([1u8; 32]),
            taker_position_id: hex::encode([2u8; 32]),
            maker: "SP1".into(),
            taker: "SP2".into(),
            price: 660_000,
            size: 50,
            side: OrderSide::Buy,
            maker_order_id: Uuid::new_v4(),
            taker_order_id: Uuid::new_v4(),
            trade_type: TradeType::Normal,
            timestamp: Utc::now().timestamp_millis(),
            tx_hash: None,
        }
    }

    #[test]
    fn test_record_and_recent() {
        let log = TradeLog::new();
        let market = Uuid::new_v4();
        let first = sample_trade(market);
        let second = sample_trade(market);
        log.record(first.clone());
        log.record(second.clone());

        let recent = log.recent(market, 10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].trade_id, second.trade_id);
        assert_eq!(log.count(market), 2);
    }

    #[test]
    fn test_tx_hash_set_once() {
        let log = TradeLog::new();
        let trade = sample_trade(Uuid::new_v4());
        let id = trade.trade_id;
        log.record(trade);
        assert!(log.set_tx_hash(id, "ab12"));
        assert!(!log.set_tx_hash(id, "cd34"));
        assert_eq!(log.get(id).unwrap().tx_hash.as_deref(), Some("ab12"));
    }
}
