//! Matching engine.
//!
//! Each tick walks every open market's YES and NO books. A book's bid list
//! holds every resting order that receives the outcome token, its ask list
//! every order that surrenders it; complementary-outcome orders join with
//! their price normalized into the book's terms, which is what lets two
//! buyers (MINT) or two sellers (MERGE) cross. Fills are applied
//! immediately, so a pair can never match twice across the two walks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::models::market::Market;
use crate::models::order::{Order, OrderSide};
use crate::models::trade::{Trade, TradeType};
use crate::services::pricing::{self, MINT_MERGE_EPSILON, PRICE_SCALE};
use crate::services::settlement::types::SettlementRequest;
use crate::store::trades::TradeLog;
use crate::store::{MarketStore, OrderStore};

use super::MATCH_INTERVAL;

/// A resting order viewed through one book, with its price normalized into
/// that book's outcome terms.
#[derive(Debug, Clone)]
struct BookEntry {
    order: Order,
    /// Price in the book outcome's terms
    price: i64,
    /// Unfilled size tracked through the walk
    remaining: i64,
}

impl BookEntry {
    fn normalized(order: Order, outcome_position_id: &str) -> Self {
        let price = if order.book_position_id() == outcome_position_id {
            order.price
        } else {
            pricing::complement(order.price)
        };
        let remaining = order.remaining_size;
        Self {
            order,
            price,
            remaining,
        }
    }
}

pub struct MatchingEngine {
    markets: Arc<MarketStore>,
    orders: Arc<OrderStore>,
    trades: Arc<TradeLog>,
    settlement_queue: Option<mpsc::Sender<SettlementRequest>>,
    chain_height: Arc<AtomicU64>,
    in_progress: AtomicBool,
}

impl MatchingEngine {
    pub fn new(
        markets: Arc<MarketStore>,
        orders: Arc<OrderStore>,
        trades: Arc<TradeLog>,
        settlement_queue: Option<mpsc::Sender<SettlementRequest>>,
        chain_height: Arc<AtomicU64>,
    ) -> Self {
        Self {
            markets,
            orders,
            trades,
            settlement_queue,
            chain_height,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn trades(&self) -> Arc<TradeLog> {
        Arc::clone(&self.trades)
    }

    /// Drive the tick loop until shutdown flips. In-flight ticks drain
    /// before the loop exits.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(MATCH_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!("matching engine started ({}ms tick)", MATCH_INTERVAL.as_millis());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("matching engine stopped");
    }

    /// One matching pass over every open market. A tick that is still
    /// running causes the next to return immediately.
    pub async fn tick(&self) {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("previous matching tick still running, skipping");
            return;
        }

        for market in self.markets.all_markets() {
            if market.resolved {
                continue;
            }
            for position_id in [market.yes_position_id.clone(), market.no_position_id.clone()] {
                self.match_book(&market, &position_id).await;
            }
        }

        self.in_progress.store(false, Ordering::Release);
    }

    /// Clear one `(market, outcome)` book. Failures abandon this book until
    /// the next tick and never affect the others.
    async fn match_book(&self, market: &Market, outcome_position_id: &str) {
        let height = self.chain_height.load(Ordering::Relaxed);
        let mut bids: Vec<BookEntry> = Vec::new();
        let mut asks: Vec<BookEntry> = Vec::new();

        for order in self.orders.get_market_orders(market.market_id) {
            if !order.status.is_resting() || order.remaining_size <= 0 {
                continue;
            }
            if height > 0 && order.is_expired_at(height) {
                continue;
            }
            if order.taker_position_id == outcome_position_id {
                bids.push(BookEntry::normalized(order, outcome_position_id));
            } else if order.maker_position_id == outcome_position_id {
                asks.push(BookEntry::normalized(order, outcome_position_id));
            }
        }

        // price-time priority; the sort is stable so equal (price, time)
        // pairs keep insertion order
        bids.sort_by(|a, b| {
            b.price
                .cmp(&a.price)
                .then(a.order.created_at.cmp(&b.order.created_at))
        });
        asks.sort_by(|a, b| {
            a.price
                .cmp(&b.price)
                .then(a.order.created_at.cmp(&b.order.created_at))
        });

        let mut bid_index = 0usize;
        let mut ask_index = 0usize;
        let mut last_trade_price: Option<i64> = None;
        let mut traded_volume = 0i64;

        while bid_index < bids.len() && ask_index < asks.len() {
            let (bid, ask) = (&bids[bid_index], &asks[ask_index]);
            if bid.price < ask.price {
                break;
            }

            let fill = bid.remaining.min(ask.remaining);
            let trade = build_trade(market, outcome_position_id, bid, ask, fill);

            self.trades.record(trade.clone());

            let (bid_ok, ask_ok) = tokio::join!(
                self.orders.fill_order(bid.order.order_id, fill),
                self.orders.fill_order(ask.order.order_id, fill),
            );
            if !bid_ok || !ask_ok {
                tracing::warn!(
                    "fill pair failed for trade {} (bid {}: {}, ask {}: {}), abandoning book until next tick",
                    trade.trade_id,
                    bid.order.order_id,
                    bid_ok,
                    ask.order.order_id,
                    ask_ok
                );
                return;
            }

            self.hand_off_settlement(&trade, bid, ask, fill);

            last_trade_price = Some(trade.price);
            traded_volume += fill;
            bids[bid_index].remaining -= fill;
            asks[ask_index].remaining -= fill;
            if bids[bid_index].remaining == 0 {
                bid_index += 1;
            }
            if asks[ask_index].remaining == 0 {
                ask_index += 1;
            }
        }

        if let Some(last) = last_trade_price {
            let best_bid = bids[bid_index..].iter().find(|e| e.remaining > 0).map(|e| e.price);
            let best_ask = asks[ask_index..].iter().find(|e| e.remaining > 0).map(|e| e.price);

            // everything into YES terms before touching market prices
            let is_yes_book = outcome_position_id == market.yes_position_id;
            let (yes_bid, yes_ask, yes_last) = if is_yes_book {
                (best_bid, best_ask, last)
            } else {
                (
                    best_ask.map(pricing::complement),
                    best_bid.map(pricing::complement),
                    pricing::complement(last),
                )
            };

            let (yes_price, no_price) =
                pricing::derive_prices(yes_bid, yes_ask, Some(yes_last), market.yes_price);
            self.markets
                .update_market_prices(market.market_id, yes_price, no_price)
                .await;
            self.markets.add_volume(market.market_id, traded_volume).await;
        }
    }

    /// Best-effort hand-off; settlement failures never revert fills.
    fn hand_off_settlement(&self, trade: &Trade, bid: &BookEntry, ask: &BookEntry, fill: i64) {
        let Some(queue) = &self.settlement_queue else {
            return;
        };
        let (maker, taker) = maker_taker(bid, ask);
        let request = SettlementRequest {
            trade: trade.clone(),
            maker_order: maker.order.clone(),
            taker_order: taker.order.clone(),
            fill_amount: fill,
        };
        if let Err(err) = queue.try_send(request) {
            tracing::error!("settlement hand-off failed for trade {}: {}", trade.trade_id, err);
        }
    }
}

/// The maker is the older order; at equal age the ask is the resting side.
fn maker_taker<'a>(bid: &'a BookEntry, ask: &'a BookEntry) -> (&'a BookEntry, &'a BookEntry) {
    if bid.order.created_at < ask.order.created_at {
        (bid, ask)
    } else {
        (ask, bid)
    }
}

fn classify(bid: &BookEntry, ask: &BookEntry) -> TradeType {
    let price_sum_near_scale =
        (bid.order.price + ask.order.price - PRICE_SCALE).abs() <= MINT_MERGE_EPSILON;
    match (bid.order.side, ask.order.side) {
        (OrderSide::Buy, OrderSide::Buy) if price_sum_near_scale => TradeType::Mint,
        (OrderSide::Sell, OrderSide::Sell) if price_sum_near_scale => TradeType::Merge,
        _ => TradeType::Normal,
    }
}

fn build_trade(
    market: &Market,
    outcome_position_id: &str,
    bid: &BookEntry,
    ask: &BookEntry,
    fill: i64,
) -> Trade {
    let (maker, taker) = maker_taker(bid, ask);
    Trade {
        trade_id: Uuid::new_v4(),
        market_id: market.market_id,
        condition_id: market.condition_id.clone(),
        outcome_position_id: outcome_position_id.to_string(),
        maker_position_id: maker.order.maker_position_id.clone(),
        taker_position_id: maker.order.taker_position_id.clone(),
        maker: maker.order.maker.clone(),
        taker: taker.order.maker.clone(),
        price: maker.price,
        size: fill,
        side: taker.order.side,
        maker_order_id: maker.order.order_id,
        taker_order_id: taker.order.order_id,
        trade_type: classify(bid, ask),
        timestamp: Utc::now().timestamp_millis(),
        tx_hash: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{NewOrder, OrderStatus};
    use std::time::Duration;

    struct Harness {
        markets: Arc<MarketStore>,
        orders: Arc<OrderStore>,
        engine: MatchingEngine,
        market: Market,
    }

    async fn harness() -> Harness {
        let markets = Arc::new(MarketStore::new(None));
        let orders = Arc::new(OrderStore::new(None));
        let trades = Arc::new(TradeLog::new());
        let market = markets
            .add_market(Market::new(&hex::encode([9u8; 32]), "Will it settle?", "SP000").unwrap())
            .await
            .unwrap();
        let engine = MatchingEngine::new(
            Arc::clone(&markets),
            Arc::clone(&orders),
            trades,
            None,
            Arc::new(AtomicU64::new(0)),
        );
        Harness {
            markets,
            orders,
            engine,
            market,
        }
    }

    fn order_input(
        market: &Market,
        maker: &str,
        side: OrderSide,
        outcome: usize,
        price: i64,
        size: i64,
    ) -> NewOrder {
        let outcome_pos = market.position_ids()[outcome].to_string();
        let complement_pos = market.complement_of(&outcome_pos).unwrap().to_string();
        let (maker_pos, taker_pos) = match side {
            OrderSide::Buy => (complement_pos, outcome_pos),
            OrderSide::Sell => (outcome_pos, complement_pos),
        };
        NewOrder {
            maker: maker.into(),
            market_id: market.market_id,
            condition_id: market.condition_id.clone(),
            maker_position_id: maker_pos,
            taker_position_id: taker_pos,
            side,
            price,
            size,
            salt: "7".into(),
            expiration: 0,
            signature: None,
            public_key: None,
        }
    }

    async fn pause() {
        // keep created_at strictly increasing between placements
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    #[tokio::test]
    async fn test_crossed_limit_orders_trade_at_maker_price() {
        let h = harness().await;
        let sell = h
            .orders
            .add_order(&h.market, order_input(&h.market, "SP_SELLER", OrderSide::Sell, 0, 660_000, 100))
            .await
            .unwrap();
        pause().await;
        let buy = h
            .orders
            .add_order(&h.market, order_input(&h.market, "SP_BUYER", OrderSide::Buy, 0, 700_000, 50))
            .await
            .unwrap();

        h.engine.tick().await;

        let trades = h.engine.trades().for_market(h.market.market_id);
        assert_eq!(trades.len(), 1);
        let trade = &trades[0];
        assert_eq!(trade.price, 660_000);
        assert_eq!(trade.size, 50);
        assert_eq!(trade.trade_type, TradeType::Normal);
        assert_eq!(trade.maker_order_id, sell.order_id);
        assert_eq!(trade.taker_order_id, buy.order_id);
        assert_eq!(trade.side, OrderSide::Buy);

        let buy = h.orders.get_order(buy.order_id).unwrap();
        assert_eq!(buy.status, OrderStatus::Filled);
        let sell = h.orders.get_order(sell.order_id).unwrap();
        assert_eq!(sell.status, OrderStatus::PartiallyFilled);
        assert_eq!(sell.remaining_size, 50);

        // mid-price rule: book is now one-sided, so the last trade governs
        let market = h.markets.get_market(h.market.market_id).unwrap();
        assert_eq!(market.yes_price, 660_000);
        assert_eq!(market.yes_price + market.no_price, PRICE_SCALE);
        assert_eq!(market.volume_24h, 50);
    }

    #[tokio::test]
    async fn test_resting_buy_governs_execution_price() {
        let h = harness().await;
        let buy = h
            .orders
            .add_order(&h.market, order_input(&h.market, "SP_BUYER", OrderSide::Buy, 0, 700_000, 50))
            .await
            .unwrap();
        pause().await;
        let sell = h
            .orders
            .add_order(&h.market, order_input(&h.market, "SP_SELLER", OrderSide::Sell, 0, 660_000, 50))
            .await
            .unwrap();

        h.engine.tick().await;

        let trades = h.engine.trades().for_market(h.market.market_id);
        assert_eq!(trades.len(), 1);
        // the older (resting) order's price governs
        assert_eq!(trades[0].price, 700_000);
        assert_eq!(trades[0].maker_order_id, buy.order_id);
        assert_eq!(trades[0].taker_order_id, sell.order_id);
        assert_eq!(trades[0].side, OrderSide::Sell);
    }

    #[tokio::test]
    async fn test_price_time_priority_at_equal_price() {
        let h = harness().await;
        let first = h
            .orders
            .add_order(&h.market, order_input(&h.market, "SP_A", OrderSide::Sell, 0, 650_000, 100))
            .await
            .unwrap();
        pause().await;
        let second = h
            .orders
            .add_order(&h.market, order_input(&h.market, "SP_B", OrderSide::Sell, 0, 650_000, 100))
            .await
            .unwrap();
        pause().await;
        h.orders
            .add_order(&h.market, order_input(&h.market, "SP_C", OrderSide::Buy, 0, 700_000, 150))
            .await
            .unwrap();

        h.engine.tick().await;

        let first = h.orders.get_order(first.order_id).unwrap();
        assert_eq!(first.status, OrderStatus::Filled);
        assert_eq!(first.filled_size, 100);

        let second = h.orders.get_order(second.order_id).unwrap();
        assert_eq!(second.status, OrderStatus::PartiallyFilled);
        assert_eq!(second.filled_size, 50);
        assert_eq!(second.remaining_size, 50);

        let trades = h.engine.trades().for_market(h.market.market_id);
        assert_eq!(trades.len(), 2);
        assert!(trades.iter().all(|t| t.price == 650_000));
    }

    #[tokio::test]
    async fn test_mint_pairs_two_buyers() {
        let h = harness().await;
        let buy_yes = h
            .orders
            .add_order(&h.market, order_input(&h.market, "SP_YES", OrderSide::Buy, 0, 600_000, 100))
            .await
            .unwrap();
        pause().await;
        let buy_no = h
            .orders
            .add_order(&h.market, order_input(&h.market, "SP_NO", OrderSide::Buy, 1, 400_000, 100))
            .await
            .unwrap();

        h.engine.tick().await;

        let trades = h.engine.trades().for_market(h.market.market_id);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].trade_type, TradeType::Mint);
        assert_eq!(trades[0].size, 100);
        assert_eq!(trades[0].price, 600_000);

        assert_eq!(h.orders.get_order(buy_yes.order_id).unwrap().status, OrderStatus::Filled);
        assert_eq!(h.orders.get_order(buy_no.order_id).unwrap().status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_merge_pairs_two_sellers() {
        let h = harness().await;
        let sell_yes = h
            .orders
            .add_order(&h.market, order_input(&h.market, "SP_YES", OrderSide::Sell, 0, 350_000, 100))
            .await
            .unwrap();
        pause().await;
        let sell_no = h
            .orders
            .add_order(&h.market, order_input(&h.market, "SP_NO", OrderSide::Sell, 1, 650_000, 100))
            .await
            .unwrap();

        h.engine.tick().await;

        let trades = h.engine.trades().for_market(h.market.market_id);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].trade_type, TradeType::Merge);
        assert_eq!(trades[0].size, 100);

        assert_eq!(h.orders.get_order(sell_yes.order_id).unwrap().status, OrderStatus::Filled);
        assert_eq!(h.orders.get_order(sell_no.order_id).unwrap().status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_complementary_buys_below_scale_do_not_cross() {
        let h = harness().await;
        h.orders
            .add_order(&h.market, order_input(&h.market, "SP_YES", OrderSide::Buy, 0, 600_000, 100))
            .await
            .unwrap();
        pause().await;
        h.orders
            .add_order(&h.market, order_input(&h.market, "SP_NO", OrderSide::Buy, 1, 300_000, 100))
            .await
            .unwrap();

        h.engine.tick().await;

        // 600k + 300k < PRICE_SCALE: the normalized ask sits above the bid
        assert!(h.engine.trades().for_market(h.market.market_id).is_empty());
    }

    #[tokio::test]
    async fn test_no_crossable_pair_remains_after_tick() {
        let h = harness().await;
        for (side, outcome, price, size) in [
            (OrderSide::Sell, 0, 640_000, 30),
            (OrderSide::Sell, 0, 650_000, 40),
            (OrderSide::Buy, 0, 660_000, 50),
            (OrderSide::Buy, 0, 620_000, 80),
        ] {
            h.orders
                .add_order(&h.market, order_input(&h.market, "SP_X", side, outcome, price, size))
                .await
                .unwrap();
            pause().await;
        }

        h.engine.tick().await;

        let book = h
            .orders
            .get_orderbook(h.market.market_id, &h.market.yes_position_id);
        if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
            assert!(bid < ask, "book still crossed: bid {} >= ask {}", bid, ask);
        }
    }

    #[tokio::test]
    async fn test_resolved_market_not_matched() {
        let h = harness().await;
        h.orders
            .add_order(&h.market, order_input(&h.market, "SP_S", OrderSide::Sell, 0, 600_000, 10))
            .await
            .unwrap();
        pause().await;
        h.orders
            .add_order(&h.market, order_input(&h.market, "SP_B", OrderSide::Buy, 0, 700_000, 10))
            .await
            .unwrap();
        h.markets.resolve_market(h.market.market_id, 0).await.unwrap();

        h.engine.tick().await;

        assert!(h.engine.trades().for_market(h.market.market_id).is_empty());
    }

    #[tokio::test]
    async fn test_expired_orders_skipped() {
        let markets = Arc::new(MarketStore::new(None));
        let orders = Arc::new(OrderStore::new(None));
        let market = markets
            .add_market(Market::new(&hex::encode([9u8; 32]), "q", "SP000").unwrap())
            .await
            .unwrap();
        let height = Arc::new(AtomicU64::new(1001));
        let engine = MatchingEngine::new(
            Arc::clone(&markets),
            Arc::clone(&orders),
            Arc::new(TradeLog::new()),
            None,
            height,
        );

        let mut expiring = order_input(&market, "SP_S", OrderSide::Sell, 0, 600_000, 10);
        expiring.expiration = 1000;
        orders.add_order(&market, expiring).await.unwrap();
        pause().await;
        orders
            .add_order(&market, order_input(&market, "SP_B", OrderSide::Buy, 0, 700_000, 10))
            .await
            .unwrap();

        engine.tick().await;

        assert!(engine.trades().for_market(market.market_id).is_empty());
    }
}
