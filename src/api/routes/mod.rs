use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::api::handlers;
use crate::AppState;

pub fn create_router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        // Markets (POST is admin-gated by the AdminKey extractor)
        .route(
            "/markets",
            get(handlers::market::list_markets).post(handlers::market::create_market),
        )
        .route("/markets/:market_id", get(handlers::market::get_market))
        .route(
            "/markets/:market_id/resolve",
            post(handlers::market::resolve_market),
        )
        .route("/markets/:market_id/stats", get(handlers::market::get_stats))
        .route(
            "/markets/:market_id/price-history",
            get(handlers::market::get_price_history),
        )
        // Orderbook reads
        .route("/orderbook/:market_id", get(handlers::orderbook::get_orderbook))
        .route(
            "/orderbook/:market_id/trades",
            get(handlers::orderbook::get_trades),
        )
        .route(
            "/orderbook/:market_id/price",
            get(handlers::orderbook::get_price),
        )
        // Orders
        .route(
            "/orders/:order_id",
            get(handlers::smart_order::get_order).delete(handlers::smart_order::cancel_order),
        )
        .route(
            "/users/:principal/orders",
            get(handlers::smart_order::get_user_orders),
        )
        // Smart routing
        .route("/smart-orders/preview", post(handlers::smart_order::preview))
        .route("/smart-orders", post(handlers::smart_order::place))
        .route(
            "/smart-orders/requirements",
            post(handlers::smart_order::requirements),
        )
        // Admin recovery surface
        .route(
            "/admin/settlements/:trade_id",
            post(handlers::admin::force_settle),
        )
}
