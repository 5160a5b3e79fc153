//! Hot order and market stores.
//!
//! Orders live in a concurrent map with secondary indices by market and by
//! maker, plus a price-sorted ladder per `(market, outcome token, side)`.
//! Writes to one order are serialized through a per-order try-lock; every
//! state change invalidates the affected book snapshot and is mirrored to
//! Postgres when a mirror is attached.

pub mod books;
pub mod locks;
pub mod persistence;
pub mod snapshot;
pub mod trades;

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use crate::models::market::Market;
use crate::models::order::{NewOrder, Order, OrderSide, OrderStatus};

use books::BookIndex;
use locks::LockRegistry;
use persistence::Mirror;
use snapshot::{OrderbookLevel, OrderbookSnapshot, SnapshotCache};

pub use snapshot::SNAPSHOT_TTL;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

// ============================================================================
// Market store
// ============================================================================

pub struct MarketStore {
    markets: DashMap<Uuid, Market>,
    mirror: Option<Arc<Mirror>>,
}

impl MarketStore {
    pub fn new(mirror: Option<Arc<Mirror>>) -> Self {
        Self {
            markets: DashMap::new(),
            mirror,
        }
    }

    pub async fn add_market(&self, market: Market) -> Result<Market, StoreError> {
        if self.markets.contains_key(&market.market_id) {
            return Err(StoreError::Conflict(format!(
                "market {} already exists",
                market.market_id
            )));
        }
        self.markets.insert(market.market_id, market.clone());
        self.mirror_market(&market).await;
        Ok(market)
    }

    pub fn get_market(&self, market_id: Uuid) -> Option<Market> {
        self.markets.get(&market_id).map(|m| m.clone())
    }

    pub fn all_markets(&self) -> Vec<Market> {
        let mut markets: Vec<Market> = self.markets.iter().map(|m| m.clone()).collect();
        markets.sort_by_key(|m| m.created_at);
        markets
    }

    pub async fn update_market_prices(&self, market_id: Uuid, yes_price: i64, no_price: i64) -> bool {
        let updated = match self.markets.get_mut(&market_id) {
            Some(mut market) => {
                market.yes_price = yes_price;
                market.no_price = no_price;
                Some(market.clone())
            }
            None => None,
        };
        match updated {
            Some(market) => {
                self.mirror_market(&market).await;
                true
            }
            None => false,
        }
    }

    pub async fn add_volume(&self, market_id: Uuid, size: i64) {
        let updated = match self.markets.get_mut(&market_id) {
            Some(mut market) => {
                market.volume_24h += size;
                Some(market.clone())
            }
            None => None,
        };
        if let Some(market) = updated {
            self.mirror_market(&market).await;
        }
    }

    pub async fn resolve_market(&self, market_id: Uuid, outcome: i32) -> Result<Market, StoreError> {
        let resolved = match self.markets.get_mut(&market_id) {
            Some(mut market) => {
                if market.resolved {
                    return Err(StoreError::Conflict(format!(
                        "market {} already resolved",
                        market_id
                    )));
                }
                market.resolved = true;
                market.outcome = Some(outcome);
                market.clone()
            }
            None => return Err(StoreError::NotFound(format!("market {}", market_id))),
        };
        self.mirror_market(&resolved).await;
        Ok(resolved)
    }

    pub(crate) fn insert_restored(&self, market: Market) {
        self.markets.insert(market.market_id, market);
    }

    async fn mirror_market(&self, market: &Market) {
        if let Some(mirror) = &self.mirror {
            if let Err(err) = mirror.upsert_market(market).await {
                tracing::error!("failed to mirror market {}: {}", market.market_id, err);
            }
        }
    }
}

// ============================================================================
// Order store
// ============================================================================

pub struct OrderStore {
    orders: DashMap<Uuid, Order>,
    market_index: DashMap<Uuid, RwLock<Vec<Uuid>>>,
    maker_index: DashMap<String, RwLock<Vec<Uuid>>>,
    books: BookIndex,
    locks: LockRegistry,
    snapshots: SnapshotCache,
    mirror: Option<Arc<Mirror>>,
}

impl OrderStore {
    pub fn new(mirror: Option<Arc<Mirror>>) -> Self {
        Self {
            orders: DashMap::new(),
            market_index: DashMap::new(),
            maker_index: DashMap::new(),
            books: BookIndex::new(),
            locks: LockRegistry::new(),
            snapshots: SnapshotCache::new(),
            mirror,
        }
    }

    /// Accept a new order: allocate an id, index it, rest it in its book,
    /// and mirror it.
    pub async fn add_order(&self, market: &Market, input: NewOrder) -> Result<Order, StoreError> {
        Order::validate_new(&input).map_err(StoreError::InvalidOrder)?;

        if !input.condition_id.eq_ignore_ascii_case(&market.condition_id) {
            return Err(StoreError::InvalidOrder(
                "condition id does not match the market".into(),
            ));
        }
        if !market.has_position(&input.maker_position_id)
            || !market.has_position(&input.taker_position_id)
        {
            return Err(StoreError::InvalidOrder(
                "position ids do not belong to the market".into(),
            ));
        }
        // side convention: the maker surrenders the complement of what the
        // order receives
        if market.complement_of(&input.taker_position_id) != Some(input.maker_position_id.as_str()) {
            return Err(StoreError::InvalidOrder(
                "position ids do not match the order side".into(),
            ));
        }

        let order = Order::accept(input);
        let book_position = order.book_position_id().to_string();

        self.orders.insert(order.order_id, order.clone());
        self.market_index
            .entry(order.market_id)
            .or_default()
            .write()
            .push(order.order_id);
        self.maker_index
            .entry(order.maker.clone())
            .or_default()
            .write()
            .push(order.order_id);
        self.books.insert(
            order.market_id,
            &book_position,
            order.side,
            order.price,
            order.order_id,
        );
        self.snapshots.invalidate(order.market_id, &book_position);
        self.mirror_order(&order).await;
        Ok(order)
    }

    pub fn get_order(&self, order_id: Uuid) -> Option<Order> {
        self.orders.get(&order_id).map(|o| o.clone())
    }

    /// All orders for a market. Ids whose bodies are missing are skipped.
    pub fn get_market_orders(&self, market_id: Uuid) -> Vec<Order> {
        let Some(ids) = self.market_index.get(&market_id) else {
            return Vec::new();
        };
        let ids = ids.read();
        ids.iter()
            .filter_map(|id| self.orders.get(id).map(|o| o.clone()))
            .collect()
    }

    pub fn get_user_orders(&self, maker: &str) -> Vec<Order> {
        let Some(ids) = self.maker_index.get(maker) else {
            return Vec::new();
        };
        let ids = ids.read();
        ids.iter()
            .filter_map(|id| self.orders.get(id).map(|o| o.clone()))
            .collect()
    }

    /// Apply a fill under the order's exclusive lock. Returns `false` when
    /// the lock is contended, the order is terminal, or the size is out of
    /// range; callers treat `false` as a retry-next-tick signal.
    pub async fn fill_order(&self, order_id: Uuid, fill_size: i64) -> bool {
        let key = format!("order:{}", order_id);
        let holder = Uuid::new_v4().to_string();
        if !self.locks.try_acquire(&key, &holder) {
            tracing::debug!("fill lock contended for order {}", order_id);
            return false;
        }

        let updated = {
            let Some(mut order) = self.orders.get_mut(&order_id) else {
                self.locks.release(&key, &holder);
                return false;
            };
            if order.status.is_terminal() || fill_size <= 0 || fill_size > order.remaining_size {
                drop(order);
                self.locks.release(&key, &holder);
                return false;
            }
            order.filled_size += fill_size;
            order.remaining_size -= fill_size;
            order.status = if order.remaining_size == 0 {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            order.updated_at = Utc::now().timestamp_millis();
            order.clone()
        };

        let book_position = updated.book_position_id().to_string();
        if updated.status == OrderStatus::Filled {
            self.books.remove(
                updated.market_id,
                &book_position,
                updated.side,
                updated.price,
                updated.order_id,
            );
        }
        self.snapshots.invalidate(updated.market_id, &book_position);
        self.mirror_order(&updated).await;
        self.locks.release(&key, &holder);
        true
    }

    pub async fn cancel_order(&self, order_id: Uuid) -> bool {
        self.transition_out(order_id, OrderStatus::Cancelled).await
    }

    pub async fn expire_order(&self, order_id: Uuid) -> bool {
        self.transition_out(order_id, OrderStatus::Expired).await
    }

    async fn transition_out(&self, order_id: Uuid, target: OrderStatus) -> bool {
        let key = format!("order:{}", order_id);
        let holder = Uuid::new_v4().to_string();
        if !self.locks.try_acquire(&key, &holder) {
            return false;
        }

        let updated = {
            let Some(mut order) = self.orders.get_mut(&order_id) else {
                self.locks.release(&key, &holder);
                return false;
            };
            if order.status.is_terminal() {
                drop(order);
                self.locks.release(&key, &holder);
                return false;
            }
            order.status = target;
            order.updated_at = Utc::now().timestamp_millis();
            order.clone()
        };

        let book_position = updated.book_position_id().to_string();
        self.books.remove(
            updated.market_id,
            &book_position,
            updated.side,
            updated.price,
            updated.order_id,
        );
        self.snapshots.invalidate(updated.market_id, &book_position);
        self.mirror_order(&updated).await;
        self.locks.release(&key, &holder);
        true
    }

    /// Aggregated book for one outcome token: bids high→low, asks low→high,
    /// resting orders only. Served from a short-lived cache that every
    /// write invalidates.
    pub fn get_orderbook(&self, market_id: Uuid, position_id: &str) -> OrderbookSnapshot {
        if let Some(cached) = self.snapshots.get(market_id, position_id) {
            return cached;
        }

        let bids = self.aggregate_levels(market_id, position_id, OrderSide::Buy);
        let asks = self.aggregate_levels(market_id, position_id, OrderSide::Sell);
        let snapshot = OrderbookSnapshot::new(market_id, position_id, bids, asks);
        self.snapshots.put(snapshot.clone());
        snapshot
    }

    fn aggregate_levels(
        &self,
        market_id: Uuid,
        position_id: &str,
        side: OrderSide,
    ) -> Vec<OrderbookLevel> {
        self.books
            .levels(market_id, position_id, side)
            .into_iter()
            .filter_map(|(price, ids)| {
                let mut size = 0i64;
                let mut order_count = 0usize;
                for id in ids {
                    if let Some(order) = self.orders.get(&id) {
                        if order.status.is_resting() {
                            size += order.remaining_size;
                            order_count += 1;
                        }
                    }
                }
                (order_count > 0).then_some(OrderbookLevel {
                    price,
                    size,
                    order_count,
                })
            })
            .collect()
    }

    /// Whether an order currently rests in its book (tests and diagnostics).
    pub fn in_book(&self, order: &Order) -> bool {
        self.books.contains(
            order.market_id,
            order.book_position_id(),
            order.side,
            order.price,
            order.order_id,
        )
    }

    pub(crate) fn insert_restored(&self, order: Order) {
        let book_position = order.book_position_id().to_string();
        self.market_index
            .entry(order.market_id)
            .or_default()
            .write()
            .push(order.order_id);
        self.maker_index
            .entry(order.maker.clone())
            .or_default()
            .write()
            .push(order.order_id);
        if order.status.is_resting() {
            self.books.insert(
                order.market_id,
                &book_position,
                order.side,
                order.price,
                order.order_id,
            );
        }
        self.orders.insert(order.order_id, order);
    }

    async fn mirror_order(&self, order: &Order) {
        if let Some(mirror) = &self.mirror {
            if let Err(err) = mirror.upsert_order(order).await {
                tracing::error!("failed to mirror order {}: {}", order.order_id, err);
            }
        }
    }
}

/// Reload markets, then non-terminal orders, re-indexing resting orders
/// into their books. Must complete before the matching engine starts.
pub async fn restore_from_persistence(
    mirror: &Mirror,
    markets: &MarketStore,
    orders: &OrderStore,
) -> Result<(usize, usize), sqlx::Error> {
    let restored_markets = mirror.load_markets().await?;
    let market_count = restored_markets.len();
    for market in restored_markets {
        markets.insert_restored(market);
    }

    let restored_orders = mirror.load_resting_orders().await?;
    let order_count = restored_orders.len();
    for order in restored_orders {
        orders.insert_restored(order);
    }

    tracing::info!(
        "restored {} markets and {} resting orders from the mirror",
        market_count,
        order_count
    );
    Ok((market_count, order_count))
}
