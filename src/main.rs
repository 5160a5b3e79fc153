use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::sync::{mpsc, watch};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod auth;
mod chain;
mod config;
mod db;
mod error;
mod models;
mod services;
mod store;

use crate::chain::client::StacksClient;
use crate::config::AppConfig;
use crate::db::Database;
use crate::services::matching::MatchingEngine;
use crate::services::monitor::BlockHeightMonitor;
use crate::services::settlement::{service as settlement_service, SettlementService};
use crate::store::persistence::Mirror;
use crate::store::trades::TradeLog;
use crate::store::{restore_from_persistence, MarketStore, OrderStore};

pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub markets: Arc<MarketStore>,
    pub orders: Arc<OrderStore>,
    pub trades: Arc<TradeLog>,
    pub settlement: Option<Arc<SettlementService>>,
    pub chain_height: Arc<AtomicU64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ctf_clob_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("starting CTF CLOB backend v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "environment: {}, network: {}",
        config.environment,
        config.stacks_network
    );

    // Durable mirror
    let db = Database::connect(&config.database_url).await?;
    tracing::info!("database connected");
    let mirror = Arc::new(Mirror::new(db.pool.clone()));
    mirror.ensure_schema().await?;

    // Hot stores, restored from the mirror before anything can match
    let markets = Arc::new(MarketStore::new(Some(Arc::clone(&mirror))));
    let orders = Arc::new(OrderStore::new(Some(Arc::clone(&mirror))));
    match restore_from_persistence(&mirror, &markets, &orders).await {
        Ok((market_count, order_count)) => {
            tracing::info!(
                "restore complete: {} markets, {} resting orders",
                market_count,
                order_count
            );
        }
        Err(err) => {
            tracing::error!("restore from mirror failed: {}", err);
            tracing::warn!("starting with empty books");
        }
    }

    let trades = Arc::new(TradeLog::new());
    let stacks_client = StacksClient::new(&config.stacks_api_url)?;
    let chain_height = Arc::new(AtomicU64::new(0));

    // Settlement bridge (optional: both contract and operator key required)
    let operator_key = config
        .stacks_operator_private_key
        .clone()
        .filter(|key| !key.is_empty());
    let (settlement, settlement_queue) = match (config.settlement_contract(), operator_key) {
        (Some(contract), Some(key)) => {
            let service = Arc::new(SettlementService::new(
                stacks_client.clone(),
                Arc::clone(&trades),
                contract,
                config.network()?,
                &key,
            )?);
            let (queue_tx, queue_rx) = mpsc::channel(1000);
            settlement_service::spawn_worker(Arc::clone(&service), queue_rx);
            tracing::info!(
                "settlement enabled against {} as {}",
                contract,
                service.operator_principal()
            );
            (Some(service), Some(queue_tx))
        }
        _ => {
            tracing::warn!(
                "settlement disabled: CTF_EXCHANGE_ADDRESS or STACKS_OPERATOR_PRIVATE_KEY missing"
            );
            (None, None)
        }
    };

    // Matching engine and block-height monitor
    let engine = Arc::new(MatchingEngine::new(
        Arc::clone(&markets),
        Arc::clone(&orders),
        Arc::clone(&trades),
        settlement_queue,
        Arc::clone(&chain_height),
    ));
    let monitor = Arc::new(BlockHeightMonitor::new(
        stacks_client,
        Arc::clone(&markets),
        Arc::clone(&orders),
        Arc::clone(&chain_height),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_task = tokio::spawn(Arc::clone(&engine).run(shutdown_rx.clone()));
    let monitor_task = tokio::spawn(Arc::clone(&monitor).run(shutdown_rx));

    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        markets,
        orders,
        trades,
        settlement,
        chain_height,
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/health/db", get(db_health_check))
        .nest("/api", api::routes::create_router(state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // stop the tickers and drain in-flight work
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(engine_task, monitor_task);
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

async fn health_check() -> &'static str {
    "OK"
}

async fn db_health_check(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> axum::Json<serde_json::Value> {
    let healthy = state.db.health_check().await;
    let height = state.chain_height.load(std::sync::atomic::Ordering::Relaxed);
    axum::Json(serde_json::json!({
        "success": true,
        "database": healthy,
        "chain_height": height,
    }))
}
