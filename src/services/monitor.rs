//! Block-height monitor.
//!
//! Polls the node for the chain tip at a long period, caches the highest
//! observed height, and expires resting orders whose expiration height has
//! passed. Poll failures never move the cached height.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::chain::client::StacksClient;
use crate::store::{MarketStore, OrderStore};

use std::time::Duration;

/// Height poll period.
pub const EXPIRY_INTERVAL: Duration = Duration::from_secs(30);

pub struct BlockHeightMonitor {
    client: StacksClient,
    markets: Arc<MarketStore>,
    orders: Arc<OrderStore>,
    height: Arc<AtomicU64>,
}

impl BlockHeightMonitor {
    pub fn new(
        client: StacksClient,
        markets: Arc<MarketStore>,
        orders: Arc<OrderStore>,
        height: Arc<AtomicU64>,
    ) -> Self {
        Self {
            client,
            markets,
            orders,
            height,
        }
    }

    /// Shared cached height, also read by the matching engine.
    pub fn height(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.height)
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(EXPIRY_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            "block-height monitor started ({}s poll)",
            EXPIRY_INTERVAL.as_secs()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("block-height monitor stopped");
    }

    /// One poll: fetch the tip and, on an observed increase, sweep expired
    /// orders.
    pub async fn poll_once(&self) {
        match self.client.block_height().await {
            Ok(observed) => {
                let cached = self.height.load(Ordering::Relaxed);
                if observed > cached {
                    self.height.store(observed, Ordering::Relaxed);
                    debug!("chain height advanced {} -> {}", cached, observed);
                    self.expire_below(observed).await;
                }
            }
            Err(err) => {
                warn!("height poll failed, keeping cached height: {}", err);
            }
        }
    }

    /// Expire every resting order in every open market whose expiration is
    /// below `height`.
    pub async fn expire_below(&self, height: u64) {
        let mut expired = 0usize;
        for market in self.markets.all_markets() {
            if market.resolved {
                continue;
            }
            for order in self.orders.get_market_orders(market.market_id) {
                if order.status.is_resting() && order.is_expired_at(height) {
                    if self.orders.expire_order(order.order_id).await {
                        expired += 1;
                    }
                }
            }
        }
        if expired > 0 {
            info!("expired {} orders below height {}", expired, height);
        }
    }
}
