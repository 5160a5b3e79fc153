//! Durable mirror of markets and orders.
//!
//! The hot store is authoritative at runtime; every state change is
//! mirrored to Postgres so a restart can rebuild the books. Prices and
//! sizes are stored as doubles in the mirror only — the hot path never
//! leaves integer micro-sats.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::market::Market;
use crate::models::order::{Order, OrderSide, OrderStatus};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS markets (
    market_id UUID PRIMARY KEY,
    condition_id TEXT NOT NULL,
    question TEXT NOT NULL,
    creator TEXT NOT NULL,
    yes_position_id TEXT NOT NULL,
    no_position_id TEXT NOT NULL,
    yes_price DOUBLE PRECISION NOT NULL,
    no_price DOUBLE PRECISION NOT NULL,
    volume_24h DOUBLE PRECISION NOT NULL DEFAULT 0,
    created_at BIGINT NOT NULL,
    resolved BOOLEAN NOT NULL DEFAULT FALSE,
    outcome INT
);

CREATE TABLE IF NOT EXISTS orders (
    order_id UUID PRIMARY KEY,
    maker TEXT NOT NULL,
    market_id UUID NOT NULL REFERENCES markets(market_id) ON DELETE CASCADE,
    condition_id TEXT NOT NULL,
    maker_position_id TEXT NOT NULL,
    taker_position_id TEXT NOT NULL,
    side TEXT NOT NULL,
    price DOUBLE PRECISION NOT NULL,
    size DOUBLE PRECISION NOT NULL,
    filled_size DOUBLE PRECISION NOT NULL,
    remaining_size DOUBLE PRECISION NOT NULL,
    status TEXT NOT NULL,
    salt TEXT,
    expiration BIGINT,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL,
    signature TEXT,
    public_key TEXT
);

CREATE INDEX IF NOT EXISTS idx_orders_market ON orders(market_id);
CREATE INDEX IF NOT EXISTS idx_orders_maker ON orders(maker);
CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
"#;

#[derive(Debug, Clone)]
pub struct Mirror {
    pool: PgPool,
}

impl Mirror {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Ensure the mirror tables exist.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn upsert_market(&self, market: &Market) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO markets (
                market_id, condition_id, question, creator,
                yes_position_id, no_position_id, yes_price, no_price,
                volume_24h, created_at, resolved, outcome
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (market_id) DO UPDATE SET
                yes_price = EXCLUDED.yes_price,
                no_price = EXCLUDED.no_price,
                volume_24h = EXCLUDED.volume_24h,
                resolved = EXCLUDED.resolved,
                outcome = EXCLUDED.outcome
            "#,
        )
        .bind(market.market_id)
        .bind(&market.condition_id)
        .bind(&market.question)
        .bind(&market.creator)
        .bind(&market.yes_position_id)
        .bind(&market.no_position_id)
        .bind(market.yes_price as f64)
        .bind(market.no_price as f64)
        .bind(market.volume_24h as f64)
        .bind(market.created_at)
        .bind(market.resolved)
        .bind(market.outcome)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_order(&self, order: &Order) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                order_id, maker, market_id, condition_id,
                maker_position_id, taker_position_id, side, price,
                size, filled_size, remaining_size, status,
                salt, expiration, created_at, updated_at, signature, public_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (order_id) DO UPDATE SET
                filled_size = EXCLUDED.filled_size,
                remaining_size = EXCLUDED.remaining_size,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(order.order_id)
        .bind(&order.maker)
        .bind(order.market_id)
        .bind(&order.condition_id)
        .bind(&order.maker_position_id)
        .bind(&order.taker_position_id)
        .bind(order.side.to_string())
        .bind(order.price as f64)
        .bind(order.size as f64)
        .bind(order.filled_size as f64)
        .bind(order.remaining_size as f64)
        .bind(order.status.to_string())
        .bind(&order.salt)
        .bind(order.expiration)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(&order.signature)
        .bind(&order.public_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_markets(&self) -> Result<Vec<Market>, sqlx::Error> {
        type Row = (
            Uuid,
            String,
            String,
            String,
            String,
            String,
            f64,
            f64,
            f64,
            i64,
            bool,
            Option<i32>,
        );
        let rows: Vec<Row> = sqlx::query_as(
            r#"
            SELECT market_id, condition_id, question, creator,
                   yes_position_id, no_position_id, yes_price, no_price,
                   volume_24h, created_at, resolved, outcome
            FROM markets
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Market {
                market_id: row.0,
                condition_id: row.1,
                question: row.2,
                creator: row.3,
                yes_position_id: row.4,
                no_position_id: row.5,
                yes_price: row.6.round() as i64,
                no_price: row.7.round() as i64,
                volume_24h: row.8.round() as i64,
                created_at: row.9,
                resolved: row.10,
                outcome: row.11,
            })
            .collect())
    }

    /// Load all non-terminal orders, oldest first so re-indexing preserves
    /// time priority.
    pub async fn load_resting_orders(&self) -> Result<Vec<Order>, sqlx::Error> {
        use sqlx::Row;

        let rows = sqlx::query(
            r#"
            SELECT order_id, maker, market_id, condition_id,
                   maker_position_id, taker_position_id, side, price,
                   size, filled_size, remaining_size, status,
                   salt, expiration, created_at, updated_at, signature, public_key
            FROM orders
            WHERE status IN ('OPEN', 'PARTIALLY_FILLED')
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let order_id: Uuid = row.get("order_id");
            let side: OrderSide = match row.get::<String, _>("side").parse() {
                Ok(side) => side,
                Err(err) => {
                    tracing::warn!("skipping order {} during restore: {}", order_id, err);
                    continue;
                }
            };
            let status: OrderStatus = match row.get::<String, _>("status").parse() {
                Ok(status) => status,
                Err(err) => {
                    tracing::warn!("skipping order {} during restore: {}", order_id, err);
                    continue;
                }
            };
            orders.push(Order {
                order_id,
                maker: row.get("maker"),
                market_id: row.get("market_id"),
                condition_id: row.get("condition_id"),
                maker_position_id: row.get("maker_position_id"),
                taker_position_id: row.get("taker_position_id"),
                side,
                price: row.get::<f64, _>("price").round() as i64,
                size: row.get::<f64, _>("size").round() as i64,
                filled_size: row.get::<f64, _>("filled_size").round() as i64,
                remaining_size: row.get::<f64, _>("remaining_size").round() as i64,
                status,
                salt: row.get::<Option<String>, _>("salt").unwrap_or_default(),
                expiration: row.get::<Option<i64>, _>("expiration").unwrap_or(0),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
                signature: row.get("signature"),
                public_key: row.get("public_key"),
            });
        }
        Ok(orders)
    }
}
