//! Price-sorted book ladders.
//!
//! One ladder per `(market, book position, side)`. Each ladder is a
//! `BTreeMap` of price to a FIFO of order ids; insertion order at a price
//! level is time priority.

use std::collections::{BTreeMap, VecDeque};

use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::models::order::OrderSide;

type LadderKey = (Uuid, String, OrderSide);

#[derive(Default)]
pub struct BookIndex {
    ladders: DashMap<LadderKey, RwLock<BTreeMap<i64, VecDeque<Uuid>>>>,
}

impl BookIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an order id at its price level, behind earlier arrivals.
    pub fn insert(
        &self,
        market_id: Uuid,
        position_id: &str,
        side: OrderSide,
        price: i64,
        order_id: Uuid,
    ) {
        let key = (market_id, position_id.to_string(), side);
        let ladder = self.ladders.entry(key).or_default();
        let mut ladder = ladder.write();
        ladder.entry(price).or_default().push_back(order_id);
    }

    /// Remove an order id from its price level. Returns whether it was
    /// present.
    pub fn remove(
        &self,
        market_id: Uuid,
        position_id: &str,
        side: OrderSide,
        price: i64,
        order_id: Uuid,
    ) -> bool {
        let key = (market_id, position_id.to_string(), side);
        let Some(ladder) = self.ladders.get(&key) else {
            return false;
        };
        let mut ladder = ladder.write();
        let Some(queue) = ladder.get_mut(&price) else {
            return false;
        };
        let Some(index) = queue.iter().position(|id| *id == order_id) else {
            return false;
        };
        queue.remove(index);
        if queue.is_empty() {
            ladder.remove(&price);
        }
        true
    }

    /// Whether an order id rests at the given coordinates.
    pub fn contains(
        &self,
        market_id: Uuid,
        position_id: &str,
        side: OrderSide,
        price: i64,
        order_id: Uuid,
    ) -> bool {
        let key = (market_id, position_id.to_string(), side);
        self.ladders
            .get(&key)
            .map(|ladder| {
                ladder
                    .read()
                    .get(&price)
                    .map(|queue| queue.contains(&order_id))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// Price levels best-first: bids descend, asks ascend. Each level keeps
    /// its FIFO order.
    pub fn levels(&self, market_id: Uuid, position_id: &str, side: OrderSide) -> Vec<(i64, Vec<Uuid>)> {
        let key = (market_id, position_id.to_string(), side);
        let Some(ladder) = self.ladders.get(&key) else {
            return Vec::new();
        };
        let ladder = ladder.read();
        let collect = |(price, queue): (&i64, &VecDeque<Uuid>)| {
            (*price, queue.iter().copied().collect::<Vec<_>>())
        };
        match side {
            OrderSide::Buy => ladder.iter().rev().map(collect).collect(),
            OrderSide::Sell => ladder.iter().map(collect).collect(),
        }
    }
}
