//! Ledger persistence
//!
//! The recorder talks to storage only through [`LedgerStore`]. Every
//! implementation must make [`LedgerStore::commit_trade`] all-or-nothing:
//!
//! 1. insert the transaction row; a taken `tx_hash` aborts with
//!    [`CommitOutcome::Duplicate`] (atomic check-and-insert, never
//!    check-then-act)
//! 2. compare-and-swap the pool row on `expected_version` (reserves,
//!    metrics and the rolling price change all travel with it)
//! 3. upsert/delete the holder rows
//!
//! Implementations:
//! - [`MemoryStore`] - single mutex over all tables (tests, replay tool)
//! - [`PgLedgerStore`] - PostgreSQL, one SQL transaction per commit

pub mod memory;
pub mod postgres;
pub mod schema;

pub use memory::MemoryStore;
pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

use crate::core_types::{Address, PoolId, TxHash};
use crate::ledger::error::LedgerError;
use crate::ledger::types::TransactionRecord;
use crate::pool::{Holder, HolderWrite, Pool};

/// Everything one trade writes, applied as a unit.
#[derive(Debug, Clone)]
pub struct TradeCommit {
    /// Post-trade pool; `version == expected_version + 1`
    pub pool: Pool,
    pub expected_version: u64,
    pub transaction: TransactionRecord,
    pub holder_writes: Vec<HolderWrite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    /// `tx_hash` was already in the log; nothing was written
    Duplicate(TransactionRecord),
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Insert a freshly minted pool and its curve holder (balance =
    /// total supply) atomically.
    ///
    /// # Errors
    /// - `DuplicatePool` if the token address is taken
    async fn insert_pool(&self, pool: &Pool) -> Result<(), LedgerError>;

    async fn get_pool(&self, pool_id: PoolId) -> Result<Option<Pool>, LedgerError>;

    async fn get_pool_by_token(&self, token: &Address) -> Result<Option<Pool>, LedgerError>;

    async fn get_holder_balance(
        &self,
        pool_id: PoolId,
        address: &Address,
    ) -> Result<Option<BigDecimal>, LedgerError>;

    /// Holders of a pool, largest balance first
    async fn list_holders(&self, pool_id: PoolId) -> Result<Vec<Holder>, LedgerError>;

    async fn get_transaction(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<TransactionRecord>, LedgerError>;

    /// Newest first by trade timestamp, then by id
    async fn list_transactions(
        &self,
        pool_id: PoolId,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, LedgerError>;

    /// Oldest transaction of the pool with `timestamp >= since` (ties broken
    /// by id)
    async fn earliest_transaction_since(
        &self,
        pool_id: PoolId,
        since: DateTime<Utc>,
    ) -> Result<Option<TransactionRecord>, LedgerError>;

    /// Apply one trade atomically (see module docs).
    ///
    /// # Errors
    /// - `ConcurrentModification` if the pool version moved
    /// - `StorageFailure` on any backend error; nothing is written
    async fn commit_trade(&self, commit: &TradeCommit) -> Result<CommitOutcome, LedgerError>;

    /// CAS `active -> graduated`; false if the pool was not active.
    async fn mark_graduated(
        &self,
        pool_id: PoolId,
        at: DateTime<Utc>,
    ) -> Result<bool, LedgerError>;
}
