//! In-memory ledger store
//!
//! All tables sit behind one mutex, so every method is trivially atomic.
//! Failure injection switches let tests prove that a failed commit leaves
//! no partial state behind.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{CommitOutcome, LedgerStore, TradeCommit};
use crate::core_types::{Address, PoolId, TxHash};
use crate::ledger::error::LedgerError;
use crate::ledger::types::TransactionRecord;
use crate::pool::{Holder, Pool, PoolStatus};

#[derive(Default)]
struct Tables {
    pools: HashMap<PoolId, Pool>,
    pools_by_token: HashMap<Address, PoolId>,
    transactions: HashMap<TxHash, TransactionRecord>,
    /// Insertion order per pool
    pool_transactions: HashMap<PoolId, Vec<TxHash>>,
    holders: HashMap<PoolId, HashMap<Address, BigDecimal>>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_next_commit: AtomicBool,
    fail_window_lookups: AtomicBool,
    commit_count: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit_trade` fail with `StorageFailure`.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Make every `earliest_transaction_since` fail until switched off.
    pub fn set_fail_window_lookups(&self, fail: bool) {
        self.fail_window_lookups.store(fail, Ordering::SeqCst);
    }

    /// Number of commits that reached the tables
    pub fn commit_count(&self) -> usize {
        self.commit_count.load(Ordering::SeqCst)
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, LedgerError> {
        self.tables
            .lock()
            .map_err(|_| LedgerError::StorageFailure("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert_pool(&self, pool: &Pool) -> Result<(), LedgerError> {
        let mut t = self.tables()?;
        if t.pools_by_token.contains_key(&pool.token_address) {
            return Err(LedgerError::DuplicatePool(pool.token_address.clone()));
        }

        t.pools_by_token.insert(pool.token_address.clone(), pool.id);
        t.pools.insert(pool.id, pool.clone());
        t.holders.entry(pool.id).or_default().insert(
            pool.curve_holder().clone(),
            pool.total_supply.clone(),
        );
        Ok(())
    }

    async fn get_pool(&self, pool_id: PoolId) -> Result<Option<Pool>, LedgerError> {
        Ok(self.tables()?.pools.get(&pool_id).cloned())
    }

    async fn get_pool_by_token(&self, token: &Address) -> Result<Option<Pool>, LedgerError> {
        let t = self.tables()?;
        Ok(t.pools_by_token
            .get(token)
            .and_then(|id| t.pools.get(id))
            .cloned())
    }

    async fn get_holder_balance(
        &self,
        pool_id: PoolId,
        address: &Address,
    ) -> Result<Option<BigDecimal>, LedgerError> {
        Ok(self
            .tables()?
            .holders
            .get(&pool_id)
            .and_then(|h| h.get(address))
            .cloned())
    }

    async fn list_holders(&self, pool_id: PoolId) -> Result<Vec<Holder>, LedgerError> {
        let t = self.tables()?;
        let mut holders: Vec<Holder> = t
            .holders
            .get(&pool_id)
            .map(|h| {
                h.iter()
                    .map(|(address, amount)| Holder {
                        pool_id,
                        address: address.clone(),
                        amount: amount.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        holders.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.address.cmp(&b.address)));
        Ok(holders)
    }

    async fn get_transaction(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        Ok(self.tables()?.transactions.get(tx_hash).cloned())
    }

    async fn list_transactions(
        &self,
        pool_id: PoolId,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let t = self.tables()?;
        let mut records: Vec<&TransactionRecord> = t
            .pool_transactions
            .get(&pool_id)
            .map(|hashes| hashes.iter().filter_map(|h| t.transactions.get(h)).collect())
            .unwrap_or_default();
        records.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        Ok(records.into_iter().take(limit).cloned().collect())
    }

    async fn earliest_transaction_since(
        &self,
        pool_id: PoolId,
        since: DateTime<Utc>,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        if self.fail_window_lookups.load(Ordering::SeqCst) {
            return Err(LedgerError::StorageFailure("injected window lookup failure".into()));
        }
        let t = self.tables()?;
        Ok(t.pool_transactions.get(&pool_id).and_then(|hashes| {
            hashes
                .iter()
                .filter_map(|h| t.transactions.get(h))
                .filter(|tx| tx.timestamp >= since)
                .min_by_key(|tx| (tx.timestamp, tx.id))
                .cloned()
        }))
    }

    async fn commit_trade(&self, commit: &TradeCommit) -> Result<CommitOutcome, LedgerError> {
        let mut t = self.tables()?;

        if let Some(existing) = t.transactions.get(&commit.transaction.tx_hash) {
            return Ok(CommitOutcome::Duplicate(existing.clone()));
        }

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::StorageFailure("injected commit failure".into()));
        }

        let pool_id = commit.pool.id;
        match t.pools.get(&pool_id) {
            Some(current) if current.version == commit.expected_version => {}
            Some(_) => return Err(LedgerError::ConcurrentModification(pool_id)),
            None => return Err(LedgerError::PoolNotFound(pool_id)),
        }

        // all checks passed: nothing below can fail
        let tx_hash = commit.transaction.tx_hash.clone();
        t.transactions
            .insert(tx_hash.clone(), commit.transaction.clone());
        t.pool_transactions.entry(pool_id).or_default().push(tx_hash);
        t.pools.insert(pool_id, commit.pool.clone());

        let holders = t.holders.entry(pool_id).or_default();
        for write in &commit.holder_writes {
            match &write.balance {
                Some(balance) => {
                    holders.insert(write.address.clone(), balance.clone());
                }
                None => {
                    holders.remove(&write.address);
                }
            }
        }

        self.commit_count.fetch_add(1, Ordering::SeqCst);
        Ok(CommitOutcome::Applied)
    }

    async fn mark_graduated(
        &self,
        pool_id: PoolId,
        at: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let mut t = self.tables()?;
        let pool = t
            .pools
            .get_mut(&pool_id)
            .ok_or(LedgerError::PoolNotFound(pool_id))?;

        if !pool.status.can_transition_to(PoolStatus::Graduated) {
            return Ok(false);
        }
        pool.status = PoolStatus::Graduated;
        pool.graduated_at = Some(at);
        pool.updated_at = at;
        pool.version += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::TransactionId;
    use crate::fee::FeeRate;
    use crate::ledger::types::TradeSide;
    use crate::pool::{HolderWrite, NewPool, PoolMetrics};
    use bigdecimal::Zero;
    use std::str::FromStr;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{}", format!("{:02x}", n).repeat(20))).unwrap()
    }

    fn pool() -> Pool {
        Pool::mint(
            NewPool {
                token_address: addr(0xaa),
                virtual_reserve_token: d("1000"),
                virtual_reserve_usdt: d("100"),
                initial_reserve_token: BigDecimal::zero(),
                total_supply: d("800"),
                trade_fee: FeeRate::zero(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn commit_for(pool: &Pool, hash: u64) -> TradeCommit {
        let mut next = pool.clone();
        next.version += 1;
        next.total_supply_token_amm = d("790");
        TradeCommit {
            expected_version: pool.version,
            transaction: TransactionRecord {
                id: TransactionId::new(),
                pool_id: pool.id,
                side: TradeSide::Buy,
                tx_hash: TxHash::parse(&format!("0x{:064x}", hash)).unwrap(),
                wallet: addr(0x01),
                token_amount: d("10"),
                usdt_amount: d("1"),
                fee_amount: BigDecimal::zero(),
                price_impact: BigDecimal::zero(),
                approximate: false,
                effective_token_before: d("1000"),
                effective_usdt_before: d("100"),
                effective_token_after: d("1000"),
                effective_usdt_after: d("101"),
                price_before: d("0.1"),
                metrics_after: PoolMetrics::default(),
                timestamp: Utc::now(),
            },
            holder_writes: vec![
                HolderWrite {
                    address: addr(0xaa),
                    balance: Some(d("790")),
                },
                HolderWrite {
                    address: addr(0x01),
                    balance: Some(d("10")),
                },
            ],
            pool: next,
        }
    }

    #[tokio::test]
    async fn test_insert_pool_creates_curve_holder() {
        let store = MemoryStore::new();
        let p = pool();
        store.insert_pool(&p).await.unwrap();

        let holders = store.list_holders(p.id).await.unwrap();
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].address, p.token_address);
        assert_eq!(holders[0].amount, d("800"));

        assert!(matches!(
            store.insert_pool(&p).await,
            Err(LedgerError::DuplicatePool(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_then_duplicate() {
        let store = MemoryStore::new();
        let p = pool();
        store.insert_pool(&p).await.unwrap();

        let commit = commit_for(&p, 1);
        assert_eq!(
            store.commit_trade(&commit).await.unwrap(),
            CommitOutcome::Applied
        );
        assert_eq!(
            store.commit_trade(&commit).await.unwrap(),
            CommitOutcome::Duplicate(commit.transaction.clone())
        );
        assert_eq!(store.commit_count(), 1);

        let stored = store.get_pool(p.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(
            store.get_holder_balance(p.id, &addr(0x01)).await.unwrap(),
            Some(d("10"))
        );
    }

    #[tokio::test]
    async fn test_stale_version_rejected() {
        let store = MemoryStore::new();
        let p = pool();
        store.insert_pool(&p).await.unwrap();
        store.commit_trade(&commit_for(&p, 1)).await.unwrap();

        // built from the pre-trade snapshot
        let stale = commit_for(&p, 2);
        assert_eq!(
            store.commit_trade(&stale).await,
            Err(LedgerError::ConcurrentModification(p.id))
        );
        assert!(store.get_transaction(&stale.transaction.tx_hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_injected_failure_writes_nothing() {
        let store = MemoryStore::new();
        let p = pool();
        store.insert_pool(&p).await.unwrap();
        store.fail_next_commit();

        let commit = commit_for(&p, 1);
        assert!(store.commit_trade(&commit).await.is_err());
        assert!(store.get_transaction(&commit.transaction.tx_hash).await.unwrap().is_none());
        assert_eq!(store.get_pool(p.id).await.unwrap().unwrap().version, 0);

        // the switch is one-shot
        assert_eq!(
            store.commit_trade(&commit).await.unwrap(),
            CommitOutcome::Applied
        );
    }

    #[tokio::test]
    async fn test_transactions_ordered_by_trade_time() {
        let store = MemoryStore::new();
        let p = pool();
        store.insert_pool(&p).await.unwrap();

        let first = commit_for(&p, 1);
        store.commit_trade(&first).await.unwrap();

        // applied second, but mined an hour earlier
        let v1 = store.get_pool(p.id).await.unwrap().unwrap();
        let mut late = commit_for(&v1, 2);
        late.transaction.timestamp = first.transaction.timestamp - chrono::Duration::hours(1);
        late.pool.price_change_24h = Some(d("-1.5"));
        store.commit_trade(&late).await.unwrap();

        let listed = store.list_transactions(p.id, 10).await.unwrap();
        let hashes: Vec<_> = listed.iter().map(|tx| tx.tx_hash.clone()).collect();
        assert_eq!(
            hashes,
            vec![first.transaction.tx_hash.clone(), late.transaction.tx_hash.clone()]
        );

        let newest = store.list_transactions(p.id, 1).await.unwrap();
        assert_eq!(newest[0].tx_hash, first.transaction.tx_hash);

        let earliest = store
            .earliest_transaction_since(p.id, late.transaction.timestamp)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(earliest.tx_hash, late.transaction.tx_hash);

        // the rolling change travels with the commit
        let stored = store.get_pool(p.id).await.unwrap().unwrap();
        assert_eq!(stored.price_change_24h, Some(d("-1.5")));
    }

    #[tokio::test]
    async fn test_mark_graduated_is_one_way() {
        let store = MemoryStore::new();
        let p = pool();
        store.insert_pool(&p).await.unwrap();

        assert!(store.mark_graduated(p.id, Utc::now()).await.unwrap());
        assert!(!store.mark_graduated(p.id, Utc::now()).await.unwrap());
        let stored = store.get_pool(p.id).await.unwrap().unwrap();
        assert!(stored.is_graduated());
        assert_eq!(stored.version, 1);
    }
}
