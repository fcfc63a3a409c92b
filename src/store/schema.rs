//! PostgreSQL schema for the curve ledger
//!
//! Amounts are `NUMERIC` without scale so wei-denominated values survive
//! untouched. Ids are ULID strings.

use anyhow::{Context, Result};
use sqlx::PgPool;

/// Create all ledger tables (idempotent).
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Initializing curve ledger schema...");

    for (name, ddl) in [
        ("curve_pools_tb", CREATE_POOLS_TABLE),
        ("curve_transactions_tb", CREATE_TRANSACTIONS_TABLE),
        ("curve_transactions_tb index", CREATE_TRANSACTIONS_INDEX),
        ("curve_holders_tb", CREATE_HOLDERS_TABLE),
    ] {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create {}", name))?;
    }

    tracing::info!("Curve ledger schema initialized successfully");
    Ok(())
}

const CREATE_POOLS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS curve_pools_tb (
    pool_id                   VARCHAR(26) PRIMARY KEY,
    token_address             VARCHAR(42) NOT NULL UNIQUE,
    reserve_token             NUMERIC NOT NULL CHECK (reserve_token >= 0),
    reserve_usdt              NUMERIC NOT NULL CHECK (reserve_usdt >= 0),
    virtual_reserve_token     NUMERIC NOT NULL,
    virtual_reserve_usdt      NUMERIC NOT NULL,
    k_constant                NUMERIC NOT NULL,
    total_supply              NUMERIC NOT NULL,
    total_supply_token_amm    NUMERIC NOT NULL CHECK (total_supply_token_amm >= 0),
    total_supply_usdt_amm     NUMERIC NOT NULL CHECK (total_supply_usdt_amm >= 0),
    trade_fee_percent         NUMERIC NOT NULL,
    price_realtime            NUMERIC NOT NULL,
    market_cap                NUMERIC NOT NULL,
    bonding_curve_percentage  NUMERIC NOT NULL,
    price_change_24h          NUMERIC,
    status                    SMALLINT NOT NULL,
    version                   BIGINT NOT NULL,
    created_at                TIMESTAMPTZ NOT NULL,
    updated_at                TIMESTAMPTZ NOT NULL,
    graduated_at              TIMESTAMPTZ
)
"#;

const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS curve_transactions_tb (
    transaction_id            VARCHAR(26) PRIMARY KEY,
    pool_id                   VARCHAR(26) NOT NULL REFERENCES curve_pools_tb(pool_id),
    side                      SMALLINT NOT NULL,
    tx_hash                   VARCHAR(66) NOT NULL UNIQUE,
    wallet_address            VARCHAR(42) NOT NULL,
    token_amount              NUMERIC NOT NULL,
    usdt_amount               NUMERIC NOT NULL,
    fee_amount                NUMERIC NOT NULL,
    price_impact              NUMERIC NOT NULL,
    approximate               BOOLEAN NOT NULL,
    effective_token_before    NUMERIC NOT NULL,
    effective_usdt_before     NUMERIC NOT NULL,
    effective_token_after     NUMERIC NOT NULL,
    effective_usdt_after      NUMERIC NOT NULL,
    price_before              NUMERIC NOT NULL,
    price_after               NUMERIC NOT NULL,
    market_cap_after          NUMERIC NOT NULL,
    bonding_curve_after       NUMERIC NOT NULL,
    created_at                TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_TRANSACTIONS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_curve_transactions_pool_time
    ON curve_transactions_tb (pool_id, created_at)
"#;

const CREATE_HOLDERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS curve_holders_tb (
    pool_id                   VARCHAR(26) NOT NULL REFERENCES curve_pools_tb(pool_id),
    holder_address            VARCHAR(42) NOT NULL,
    amount                    NUMERIC NOT NULL CHECK (amount >= 0),
    PRIMARY KEY (pool_id, holder_address)
)
"#;
