//! Aggregated orderbook snapshots with a short-lived cache.

use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

pub const SNAPSHOT_TTL: Duration = Duration::from_secs(10);

/// One aggregated price level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderbookLevel {
    pub price: i64,
    pub size: i64,
    pub order_count: usize,
}

/// Aggregated view of one `(market, outcome token)` book.
#[derive(Debug, Clone, Serialize)]
pub struct OrderbookSnapshot {
    pub market_id: Uuid,
    pub position_id: String,
    /// Bid levels, highest price first
    pub bids: Vec<OrderbookLevel>,
    /// Ask levels, lowest price first
    pub asks: Vec<OrderbookLevel>,
    pub timestamp: i64,
}

impl OrderbookSnapshot {
    pub fn new(market_id: Uuid, position_id: &str, bids: Vec<OrderbookLevel>, asks: Vec<OrderbookLevel>) -> Self {
        Self {
            market_id,
            position_id: position_id.to_string(),
            bids,
            asks,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn best_bid(&self) -> Option<i64> {
        self.bids.first().map(|level| level.price)
    }

    pub fn best_ask(&self) -> Option<i64> {
        self.asks.first().map(|level| level.price)
    }
}

/// Best-effort snapshot cache. Must be invalidated after every successful
/// order-state change for the affected book.
#[derive(Default)]
pub struct SnapshotCache {
    entries: DashMap<(Uuid, String), (Instant, OrderbookSnapshot)>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, market_id: Uuid, position_id: &str) -> Option<OrderbookSnapshot> {
        let key = (market_id, position_id.to_string());
        let entry = self.entries.get(&key)?;
        let (stored_at, snapshot) = entry.value();
        if stored_at.elapsed() < SNAPSHOT_TTL {
            Some(snapshot.clone())
        } else {
            None
        }
    }

    pub fn put(&self, snapshot: OrderbookSnapshot) {
        let key = (snapshot.market_id, snapshot.position_id.clone());
        self.entries.insert(key, (Instant::now(), snapshot));
    }

    pub fn invalidate(&self, market_id: Uuid, position_id: &str) {
        self.entries.remove(&(market_id, position_id.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(market: Uuid) -> OrderbookSnapshot {
        OrderbookSnapshot::new(
            market,
            "yes",
            vec![OrderbookLevel { price: 650_000, size: 100, order_count: 2 }],
            vec![OrderbookLevel { price: 700_000, size: 50, order_count: 1 }],
        )
    }

    #[test]
    fn test_cache_round_trip() {
        let cache = SnapshotCache::new();
        let market = Uuid::new_v4();
        assert!(cache.get(market, "yes").is_none());
        cache.put(snapshot(market));
        let cached = cache.get(market, "yes").unwrap();
        assert_eq!(cached.best_bid(), Some(650_000));
        assert_eq!(cached.best_ask(), Some(700_000));
    }

    #[test]
    fn test_invalidate_clears_entry() {
        let cache = SnapshotCache::new();
        let market = Uuid::new_v4();
        cache.put(snapshot(market));
        cache.invalidate(market, "yes");
        assert!(cache.get(market, "yes").is_none());
    }
}
