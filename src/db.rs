//! Connection pool and schema bootstrap.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::error::{StoreContext, StoreResult};

/// Schema statements, in foreign-key order. Each one is idempotent.
const SCHEMA: &[(&str, &str)] = &[
    (
        "products",
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            price DOUBLE PRECISION NOT NULL CHECK (price >= 0),
            category TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    ),
    (
        "orders",
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id BIGSERIAL PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    ),
    (
        "order_items",
        r#"
        CREATE TABLE IF NOT EXISTS order_items (
            id BIGSERIAL PRIMARY KEY,
            order_id BIGINT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            product_id BIGINT NOT NULL REFERENCES products(id),
            quantity BIGINT NOT NULL CHECK (quantity > 0)
        )
        "#,
    ),
    (
        "order_items_order_id_idx",
        "CREATE INDEX IF NOT EXISTS order_items_order_id_idx ON order_items (order_id)",
    ),
    (
        "order_products",
        r#"
        CREATE TABLE IF NOT EXISTS order_products (
            order_id BIGINT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            product_id BIGINT NOT NULL REFERENCES products(id),
            PRIMARY KEY (order_id, product_id)
        )
        "#,
    ),
    (
        "coupons",
        r#"
        CREATE TABLE IF NOT EXISTS coupons (
            id BIGSERIAL PRIMARY KEY,
            code TEXT NOT NULL UNIQUE
        )
        "#,
    ),
    (
        "coupon_sources",
        r#"
        CREATE TABLE IF NOT EXISTS coupon_sources (
            id BIGSERIAL PRIMARY KEY,
            path TEXT NOT NULL UNIQUE
        )
        "#,
    ),
    (
        "coupon_sources_join",
        r#"
        CREATE TABLE IF NOT EXISTS coupon_sources_join (
            coupon_id BIGINT NOT NULL REFERENCES coupons(id) ON DELETE CASCADE,
            source_id BIGINT NOT NULL REFERENCES coupon_sources(id) ON DELETE CASCADE,
            PRIMARY KEY (coupon_id, source_id)
        )
        "#,
    ),
];

/// Tables created by [`migrate`], children first, for teardown.
pub const TABLES: &[&str] = &[
    "coupon_sources_join",
    "coupon_sources",
    "coupons",
    "order_products",
    "order_items",
    "orders",
    "products",
];

#[instrument(skip(config))]
pub async fn connect(config: &DatabaseConfig) -> StoreResult<PgPool> {
    info!("connecting to database");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .connect(&config.url)
        .await
        .context("connect to database")?;

    info!("database connection pool created");
    Ok(pool)
}

/// Create every table the service needs.
#[instrument(skip(pool))]
pub async fn migrate(pool: &PgPool) -> StoreResult<()> {
    for (name, statement) in SCHEMA {
        sqlx::query(*statement)
            .execute(pool)
            .await
            .context(format!("create {name}"))?;
    }
    info!(objects = SCHEMA.len(), "database schema ready");
    Ok(())
}
