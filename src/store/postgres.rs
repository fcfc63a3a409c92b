//! PostgreSQL ledger store
//!
//! Each trade commit is one SQL transaction. The `tx_hash` UNIQUE constraint
//! is the idempotency authority: a conflicting insert rolls the whole
//! transaction back and the existing row is returned instead. Pool rows are
//! updated with a CAS on `version`.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;

use super::{CommitOutcome, LedgerStore, TradeCommit};
use crate::core_types::{Address, PoolId, TransactionId, TxHash};
use crate::fee::FeeRate;
use crate::ledger::error::LedgerError;
use crate::ledger::types::{TradeSide, TransactionRecord};
use crate::pool::{Holder, Pool, PoolMetrics, PoolStatus};

const POOL_COLUMNS: &str = r#"
    pool_id, token_address, reserve_token, reserve_usdt,
    virtual_reserve_token, virtual_reserve_usdt, k_constant, total_supply,
    total_supply_token_amm, total_supply_usdt_amm, trade_fee_percent,
    price_realtime, market_cap, bonding_curve_percentage, price_change_24h,
    status, version, created_at, updated_at, graduated_at
"#;

const TRANSACTION_COLUMNS: &str = r#"
    transaction_id, pool_id, side, tx_hash, wallet_address,
    token_amount, usdt_amount, fee_amount, price_impact, approximate,
    effective_token_before, effective_usdt_before,
    effective_token_after, effective_usdt_after,
    price_before, price_after, market_cap_after, bonding_curve_after,
    created_at
"#;

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_pool(row: &PgRow) -> Result<Pool, LedgerError> {
        let status_id: i16 = row.try_get("status")?;
        let status = PoolStatus::from_id(status_id)
            .ok_or_else(|| corrupt(format!("Invalid pool status: {}", status_id)))?;

        let fee_percent: BigDecimal = row.try_get("trade_fee_percent")?;
        let trade_fee = FeeRate::from_percent(fee_percent)
            .map_err(|e| corrupt(format!("Invalid trade fee: {}", e)))?;

        let version: i64 = row.try_get("version")?;

        Ok(Pool {
            id: parse_column(row, "pool_id")?,
            token_address: Address::parse(&row.try_get::<String, _>("token_address")?)
                .map_err(|e| corrupt(e.to_string()))?,
            reserve_token: row.try_get("reserve_token")?,
            reserve_usdt: row.try_get("reserve_usdt")?,
            virtual_reserve_token: row.try_get("virtual_reserve_token")?,
            virtual_reserve_usdt: row.try_get("virtual_reserve_usdt")?,
            k_constant: row.try_get("k_constant")?,
            total_supply: row.try_get("total_supply")?,
            total_supply_token_amm: row.try_get("total_supply_token_amm")?,
            total_supply_usdt_amm: row.try_get("total_supply_usdt_amm")?,
            trade_fee,
            metrics: PoolMetrics {
                price_realtime: row.try_get("price_realtime")?,
                market_cap: row.try_get("market_cap")?,
                bonding_curve_percentage: row.try_get("bonding_curve_percentage")?,
            },
            price_change_24h: row.try_get("price_change_24h")?,
            status,
            version: version as u64,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            graduated_at: row.try_get("graduated_at")?,
        })
    }

    fn row_to_transaction(row: &PgRow) -> Result<TransactionRecord, LedgerError> {
        let side_id: i16 = row.try_get("side")?;
        let side = TradeSide::from_id(side_id)
            .ok_or_else(|| corrupt(format!("Invalid trade side: {}", side_id)))?;

        Ok(TransactionRecord {
            id: parse_column(row, "transaction_id")?,
            pool_id: parse_column(row, "pool_id")?,
            side,
            tx_hash: TxHash::parse(&row.try_get::<String, _>("tx_hash")?)
                .map_err(|e| corrupt(e.to_string()))?,
            wallet: Address::parse(&row.try_get::<String, _>("wallet_address")?)
                .map_err(|e| corrupt(e.to_string()))?,
            token_amount: row.try_get("token_amount")?,
            usdt_amount: row.try_get("usdt_amount")?,
            fee_amount: row.try_get("fee_amount")?,
            price_impact: row.try_get("price_impact")?,
            approximate: row.try_get("approximate")?,
            effective_token_before: row.try_get("effective_token_before")?,
            effective_usdt_before: row.try_get("effective_usdt_before")?,
            effective_token_after: row.try_get("effective_token_after")?,
            effective_usdt_after: row.try_get("effective_usdt_after")?,
            price_before: row.try_get("price_before")?,
            metrics_after: PoolMetrics {
                price_realtime: row.try_get("price_after")?,
                market_cap: row.try_get("market_cap_after")?,
                bonding_curve_percentage: row.try_get("bonding_curve_after")?,
            },
            timestamp: row.try_get("created_at")?,
        })
    }
}

fn corrupt(msg: String) -> LedgerError {
    LedgerError::StorageFailure(format!("corrupt row: {}", msg))
}

fn parse_column<T: FromStr>(row: &PgRow, column: &str) -> Result<T, LedgerError> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|_| corrupt(format!("Invalid {}: {}", column, raw)))
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn insert_pool(&self, pool: &Pool) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO curve_pools_tb
                (pool_id, token_address, reserve_token, reserve_usdt,
                 virtual_reserve_token, virtual_reserve_usdt, k_constant, total_supply,
                 total_supply_token_amm, total_supply_usdt_amm, trade_fee_percent,
                 price_realtime, market_cap, bonding_curve_percentage, price_change_24h,
                 status, version, created_at, updated_at, graduated_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                 $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            ON CONFLICT (token_address) DO NOTHING
            "#,
        )
        .bind(pool.id.to_string())
        .bind(pool.token_address.as_str())
        .bind(&pool.reserve_token)
        .bind(&pool.reserve_usdt)
        .bind(&pool.virtual_reserve_token)
        .bind(&pool.virtual_reserve_usdt)
        .bind(&pool.k_constant)
        .bind(&pool.total_supply)
        .bind(&pool.total_supply_token_amm)
        .bind(&pool.total_supply_usdt_amm)
        .bind(pool.trade_fee.percent())
        .bind(&pool.metrics.price_realtime)
        .bind(&pool.metrics.market_cap)
        .bind(&pool.metrics.bonding_curve_percentage)
        .bind(&pool.price_change_24h)
        .bind(pool.status.id())
        .bind(pool.version as i64)
        .bind(pool.created_at)
        .bind(pool.updated_at)
        .bind(pool.graduated_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(LedgerError::DuplicatePool(pool.token_address.clone()));
        }

        sqlx::query(
            r#"
            INSERT INTO curve_holders_tb (pool_id, holder_address, amount)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(pool.id.to_string())
        .bind(pool.curve_holder().as_str())
        .bind(&pool.total_supply)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_pool(&self, pool_id: PoolId) -> Result<Option<Pool>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM curve_pools_tb WHERE pool_id = $1",
            POOL_COLUMNS
        ))
        .bind(pool_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_pool).transpose()
    }

    async fn get_pool_by_token(&self, token: &Address) -> Result<Option<Pool>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM curve_pools_tb WHERE token_address = $1",
            POOL_COLUMNS
        ))
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_pool).transpose()
    }

    async fn get_holder_balance(
        &self,
        pool_id: PoolId,
        address: &Address,
    ) -> Result<Option<BigDecimal>, LedgerError> {
        let amount = sqlx::query_scalar::<_, BigDecimal>(
            "SELECT amount FROM curve_holders_tb WHERE pool_id = $1 AND holder_address = $2",
        )
        .bind(pool_id.to_string())
        .bind(address.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(amount)
    }

    async fn list_holders(&self, pool_id: PoolId) -> Result<Vec<Holder>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT holder_address, amount FROM curve_holders_tb
            WHERE pool_id = $1
            ORDER BY amount DESC, holder_address ASC
            "#,
        )
        .bind(pool_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut holders = Vec::with_capacity(rows.len());
        for row in rows {
            holders.push(Holder {
                pool_id,
                address: Address::parse(&row.try_get::<String, _>("holder_address")?)
                    .map_err(|e| corrupt(e.to_string()))?,
                amount: row.try_get("amount")?,
            });
        }
        Ok(holders)
    }

    async fn get_transaction(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM curve_transactions_tb WHERE tx_hash = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(tx_hash.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn list_transactions(
        &self,
        pool_id: PoolId,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM curve_transactions_tb
            WHERE pool_id = $1
            ORDER BY created_at DESC, transaction_id DESC
            LIMIT $2
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(pool_id.to_string())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    async fn earliest_transaction_since(
        &self,
        pool_id: PoolId,
        since: DateTime<Utc>,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM curve_transactions_tb
            WHERE pool_id = $1 AND created_at >= $2
            ORDER BY created_at ASC, transaction_id ASC
            LIMIT 1
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(pool_id.to_string())
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn commit_trade(&self, commit: &TradeCommit) -> Result<CommitOutcome, LedgerError> {
        let record = &commit.transaction;
        let pool = &commit.pool;
        let mut tx = self.pool.begin().await?;

        // 1. Idempotency: the unique insert decides, not a prior read
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO curve_transactions_tb ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19)
            ON CONFLICT (tx_hash) DO NOTHING
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(record.id.to_string())
        .bind(record.pool_id.to_string())
        .bind(record.side.id())
        .bind(record.tx_hash.as_str())
        .bind(record.wallet.as_str())
        .bind(&record.token_amount)
        .bind(&record.usdt_amount)
        .bind(&record.fee_amount)
        .bind(&record.price_impact)
        .bind(record.approximate)
        .bind(&record.effective_token_before)
        .bind(&record.effective_usdt_before)
        .bind(&record.effective_token_after)
        .bind(&record.effective_usdt_after)
        .bind(&record.price_before)
        .bind(&record.metrics_after.price_realtime)
        .bind(&record.metrics_after.market_cap)
        .bind(&record.metrics_after.bonding_curve_percentage)
        .bind(record.timestamp)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            let existing = self.get_transaction(&record.tx_hash).await?.ok_or_else(|| {
                LedgerError::StorageFailure(format!(
                    "tx_hash {} conflicted but no row found",
                    record.tx_hash
                ))
            })?;
            return Ok(CommitOutcome::Duplicate(existing));
        }

        // 2. Pool row CAS
        let updated = sqlx::query(
            r#"
            UPDATE curve_pools_tb
            SET reserve_token = $1, reserve_usdt = $2,
                total_supply_token_amm = $3, total_supply_usdt_amm = $4,
                price_realtime = $5, market_cap = $6, bonding_curve_percentage = $7,
                price_change_24h = $8, version = $9, updated_at = $10
            WHERE pool_id = $11 AND version = $12
            "#,
        )
        .bind(&pool.reserve_token)
        .bind(&pool.reserve_usdt)
        .bind(&pool.total_supply_token_amm)
        .bind(&pool.total_supply_usdt_amm)
        .bind(&pool.metrics.price_realtime)
        .bind(&pool.metrics.market_cap)
        .bind(&pool.metrics.bonding_curve_percentage)
        .bind(&pool.price_change_24h)
        .bind(pool.version as i64)
        .bind(pool.updated_at)
        .bind(pool.id.to_string())
        .bind(commit.expected_version as i64)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(LedgerError::ConcurrentModification(pool.id));
        }

        // 3. Holder rows
        for write in &commit.holder_writes {
            match &write.balance {
                Some(balance) => {
                    sqlx::query(
                        r#"
                        INSERT INTO curve_holders_tb (pool_id, holder_address, amount)
                        VALUES ($1, $2, $3)
                        ON CONFLICT (pool_id, holder_address)
                        DO UPDATE SET amount = EXCLUDED.amount
                        "#,
                    )
                    .bind(pool.id.to_string())
                    .bind(write.address.as_str())
                    .bind(balance)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query(
                        "DELETE FROM curve_holders_tb WHERE pool_id = $1 AND holder_address = $2",
                    )
                    .bind(pool.id.to_string())
                    .bind(write.address.as_str())
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(CommitOutcome::Applied)
    }

    async fn mark_graduated(
        &self,
        pool_id: PoolId,
        at: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE curve_pools_tb
            SET status = $1, graduated_at = $2, updated_at = $2, version = version + 1
            WHERE pool_id = $3 AND status = $4
            "#,
        )
        .bind(PoolStatus::Graduated.id())
        .bind(at)
        .bind(pool_id.to_string())
        .bind(PoolStatus::Active.id())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.get_pool(pool_id).await? {
            Some(_) => Ok(false),
            None => Err(LedgerError::PoolNotFound(pool_id)),
        }
    }
}
