//! Trades and reads that interleave on one pool, driven through a store that
//! can stall a single read.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use curve_ledger::config::EngineConfig;
use curve_ledger::ledger::{TradeRequest, TradeSide, TransactionRecorder};
use curve_ledger::store::{CommitOutcome, LedgerStore, MemoryStore, TradeCommit};
use curve_ledger::{
    Address, FeeRate, Holder, LedgerError, NewPool, Pool, PoolId, TransactionRecord, TxHash,
};

const STALL: Duration = Duration::from_millis(200);

/// Delegates to a [`MemoryStore`]; each armed switch stalls the next call of
/// its method once.
#[derive(Default)]
struct StallingStore {
    inner: MemoryStore,
    stall_pool_read: AtomicBool,
    stall_tx_lookup: AtomicBool,
    stall_window_lookup: AtomicBool,
}

#[async_trait]
impl LedgerStore for StallingStore {
    fn name(&self) -> &'static str {
        "stalling-memory"
    }

    async fn insert_pool(&self, pool: &Pool) -> Result<(), LedgerError> {
        self.inner.insert_pool(pool).await
    }

    async fn get_pool(&self, pool_id: PoolId) -> Result<Option<Pool>, LedgerError> {
        let pool = self.inner.get_pool(pool_id).await;
        // the snapshot is taken, then handed back late
        if self.stall_pool_read.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(STALL).await;
        }
        pool
    }

    async fn get_pool_by_token(
        &self,
        token: &Address,
    ) -> Result<Option<Pool>, LedgerError> {
        self.inner.get_pool_by_token(token).await
    }

    async fn get_holder_balance(
        &self,
        pool_id: PoolId,
        address: &Address,
    ) -> Result<Option<BigDecimal>, LedgerError> {
        self.inner.get_holder_balance(pool_id, address).await
    }

    async fn list_holders(&self, pool_id: PoolId) -> Result<Vec<Holder>, LedgerError> {
        self.inner.list_holders(pool_id).await
    }

    async fn get_transaction(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        let found = self.inner.get_transaction(tx_hash).await;
        if self.stall_tx_lookup.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(STALL).await;
        }
        found
    }

    async fn list_transactions(
        &self,
        pool_id: PoolId,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        self.inner.list_transactions(pool_id, limit).await
    }

    async fn earliest_transaction_since(
        &self,
        pool_id: PoolId,
        since: DateTime<Utc>,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        if self.stall_window_lookup.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(STALL).await;
        }
        self.inner.earliest_transaction_since(pool_id, since).await
    }

    async fn commit_trade(
        &self,
        commit: &TradeCommit,
    ) -> Result<CommitOutcome, LedgerError> {
        self.inner.commit_trade(commit).await
    }

    async fn mark_graduated(
        &self,
        pool_id: PoolId,
        at: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        self.inner.mark_graduated(pool_id, at).await
    }
}

fn d(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn addr(n: u8) -> Address {
    Address::parse(&format!("0x{}", format!("{:02x}", n).repeat(20))).unwrap()
}

fn hash(n: u64) -> TxHash {
    TxHash::parse(&format!("0x{:064x}", n)).unwrap()
}

fn launch() -> NewPool {
    NewPool {
        token_address: addr(0x10),
        virtual_reserve_token: d("1888888888e18"),
        virtual_reserve_usdt: d("100000e18"),
        initial_reserve_token: d("800000000e18"),
        total_supply: d("1000000000e18"),
        trade_fee: FeeRate::from_percent(d("0.1")).unwrap(),
    }
}

fn buy(pool: PoolId, n: u64, wallet: u8, at: DateTime<Utc>) -> TradeRequest {
    TradeRequest::new(pool, TradeSide::Buy, hash(n), addr(wallet), d("20000000e18"), d("1000e18"))
        .at(at)
}

fn setup() -> (Arc<StallingStore>, Arc<TransactionRecorder>) {
    let store = Arc::new(StallingStore::default());
    let config = EngineConfig {
        snapshot_cache_ttl_secs: 60,
        ..EngineConfig::default()
    };
    let recorder = TransactionRecorder::new(store.clone(), &config);
    (store, Arc::new(recorder))
}

#[tokio::test]
async fn test_slow_window_lookup_does_not_overwrite_newer_change() {
    let (store, rec) = setup();
    let pool_id = rec.create_pool(launch()).await.unwrap().id;
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

    store.stall_window_lookup.store(true, Ordering::SeqCst);
    let first = {
        let rec = rec.clone();
        tokio::spawn(async move { rec.apply_trade(buy(pool_id, 1, 0x01, t0)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = rec
        .apply_trade(buy(pool_id, 2, 0x02, t0 + ChronoDuration::hours(1)))
        .await
        .unwrap();
    let first = first.await.unwrap().unwrap();

    // both trades sit in one window, so the first one's opening price is the base
    let base = &first.transaction.price_before;
    let expected = (second.transaction.price_after() - base) / base * BigDecimal::from(100);

    let stored = store.get_pool(pool_id).await.unwrap().unwrap();
    assert_eq!(stored.version, 2);
    let change = stored.price_change_24h.expect("price change recorded");
    assert!((change - expected).abs() < d("1e-30"));
}

#[tokio::test]
async fn test_snapshot_read_across_commit_is_not_cached() {
    let (store, rec) = setup();
    let pool_id = rec.create_pool(launch()).await.unwrap().id;

    store.stall_pool_read.store(true, Ordering::SeqCst);
    let reader = {
        let rec = rec.clone();
        tokio::spawn(async move { rec.pool(pool_id).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    rec.apply_trade(buy(pool_id, 1, 0x01, Utc::now())).await.unwrap();

    // the slow reader still answers with what it saw
    assert_eq!(reader.await.unwrap().unwrap().version, 0);

    assert_eq!(rec.pool(pool_id).await.unwrap().version, 1);
    assert_eq!(store.inner.get_pool(pool_id).await.unwrap().unwrap().version, 1);
}

#[tokio::test]
async fn test_same_hash_caught_at_commit_replays() {
    let (store, rec) = setup();
    let pool_id = rec.create_pool(launch()).await.unwrap().id;
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

    // the first submission misses the fast-path read, then waits
    store.stall_tx_lookup.store(true, Ordering::SeqCst);
    let late = {
        let rec = rec.clone();
        tokio::spawn(async move { rec.apply_trade(buy(pool_id, 7, 0x01, at)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let applied = rec.apply_trade(buy(pool_id, 7, 0x01, at)).await.unwrap();
    let replayed = late.await.unwrap().unwrap();

    assert!(!applied.duplicate);
    assert!(replayed.duplicate);
    assert_eq!(replayed.transaction, applied.transaction);
    assert_eq!(store.inner.commit_count(), 1);
    assert_eq!(store.inner.get_pool(pool_id).await.unwrap().unwrap().version, 1);
}
