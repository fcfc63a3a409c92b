//! Transaction Recorder - applies confirmed trades to the ledger
//!
//! # Flow (per trade)
//!
//! ```text
//! validate amounts ─► fast-path duplicate read ─► lock pool
//!     ─► load pool + holders ─► quote ─► reserve/holder deltas
//!     ─► consistency policy ─► metrics + 24h price change
//!     ─► atomic commit ─► unlock ─► notify (spawned)
//! ```
//!
//! The atomic commit is the idempotency authority: two concurrent
//! submissions of one `tx_hash` may both pass the fast path, but only one
//! insert wins and the other returns the winner's record.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::cache::PoolSnapshotCache;
use super::error::LedgerError;
use super::locks::PoolLocks;
use super::notifier::{NotifyDispatcher, PoolSnapshot, TradeEvent};
use super::state::TradeState;
use super::types::{
    AmountPolicy, ConsistencyFault, ConsistencyPolicy, GraduationOutcome, TradeOutcome,
    TradeRequest, TradeSide, TransactionRecord,
};
use crate::config::EngineConfig;
use crate::core_types::{Address, PoolId, TransactionId, TxHash};
use crate::logging::{AUDIT_TARGET, TRADE_TARGET};
use crate::metrics::MetricsDeriver;
use crate::money;
use crate::pool::{Holder, HolderLedger, NewPool, Pool, ReserveLedger};
use crate::pricing::PricingEngine;
use crate::store::{CommitOutcome, LedgerStore, TradeCommit};

/// Ledger-affecting amounts of one trade after the amount policy
struct TradeAmounts {
    token: BigDecimal,
    usdt: BigDecimal,
    fee: BigDecimal,
    price_impact: BigDecimal,
    approximate: bool,
}

pub struct TransactionRecorder {
    store: Arc<dyn LedgerStore>,
    locks: PoolLocks,
    pricing: PricingEngine,
    metrics: MetricsDeriver,
    amount_policy: AmountPolicy,
    consistency_policy: ConsistencyPolicy,
    price_window: chrono::Duration,
    cache: PoolSnapshotCache,
    notifier: NotifyDispatcher,
}

impl TransactionRecorder {
    pub fn new(store: Arc<dyn LedgerStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            locks: PoolLocks::new(),
            pricing: PricingEngine::new(config.precision),
            metrics: MetricsDeriver::new(config.precision, config.market_cap_policy),
            amount_policy: config.amount_policy,
            consistency_policy: config.consistency_policy,
            price_window: config.price_window(),
            cache: PoolSnapshotCache::new(config.snapshot_cache_ttl_secs),
            notifier: NotifyDispatcher::noop(),
        }
    }

    pub fn with_notifier(mut self, notifier: NotifyDispatcher) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    // ========================================================================
    // Pool lifecycle
    // ========================================================================

    /// Mint a pool with zero real USDT and the whole supply on the curve.
    pub async fn create_pool(&self, params: NewPool) -> Result<Pool, LedgerError> {
        let mut pool = Pool::mint(params, Utc::now())?;
        pool.metrics = self.metrics.derive_metrics(&pool);

        self.store.insert_pool(&pool).await?;

        tracing::info!(
            pool_id = %pool.id,
            token = %pool.token_address,
            k = %pool.k_constant,
            store = self.store.name(),
            "Pool created"
        );
        Ok(pool)
    }

    /// One-way `active -> graduated`. Repeated calls are no-ops.
    pub async fn graduate(&self, pool_id: PoolId) -> Result<GraduationOutcome, LedgerError> {
        let _guard = self.locks.acquire(pool_id).await;

        let pool = self.load_pool(pool_id).await?;
        if pool.is_graduated() {
            return Ok(GraduationOutcome::AlreadyGraduated);
        }

        let graduated = self.store.mark_graduated(pool_id, Utc::now()).await?;
        self.cache.invalidate(pool_id);

        if graduated {
            tracing::info!(
                pool_id = %pool_id,
                market_cap = %pool.metrics.market_cap,
                "Pool graduated"
            );
            Ok(GraduationOutcome::Graduated)
        } else {
            Ok(GraduationOutcome::AlreadyGraduated)
        }
    }

    // ========================================================================
    // Trade application
    // ========================================================================

    /// Apply one confirmed trade exactly once.
    ///
    /// # Errors
    /// - validation errors before any mutation (amounts, wallet, unknown or
    ///   graduated pool, `tx_hash` used on another pool)
    /// - `PrecisionUnderflow` when the trade prices to zero
    /// - `ConsistencyFault` under the reject policy
    /// - `StorageFailure` / `ConcurrentModification`: nothing was written
    pub async fn apply_trade(&self, req: TradeRequest) -> Result<TradeOutcome, LedgerError> {
        self.validate_amounts(&req)?;

        // Fast path only; the commit re-checks atomically
        if let Some(existing) = self.store.get_transaction(&req.tx_hash).await? {
            return Self::replay(existing, req.pool_id);
        }

        let guard = self.locks.acquire(req.pool_id).await;
        let mut state = TradeState::Unseen;
        transition(&mut state, TradeState::Applying, &req.tx_hash);

        let prepared = self.prepare(&req).await;
        let (commit, faults) = match prepared {
            Ok(p) => p,
            Err(e) => {
                transition(&mut state, TradeState::Rejected, &req.tx_hash);
                tracing::debug!(
                    pool_id = %req.pool_id,
                    tx_hash = %req.tx_hash,
                    code = e.code(),
                    "Trade rejected: {}", e
                );
                return Err(e);
            }
        };

        match self.store.commit_trade(&commit).await {
            Ok(CommitOutcome::Applied) => {}
            Ok(CommitOutcome::Duplicate(existing)) => {
                // lost the race to a concurrent submission of the same hash
                transition(&mut state, TradeState::Applied, &req.tx_hash);
                return Self::replay(existing, req.pool_id);
            }
            Err(e) => {
                transition(&mut state, TradeState::Rejected, &req.tx_hash);
                tracing::error!(
                    pool_id = %req.pool_id,
                    tx_hash = %req.tx_hash,
                    store = self.store.name(),
                    "Trade commit failed: {}", e
                );
                return Err(e);
            }
        }
        transition(&mut state, TradeState::Applied, &req.tx_hash);
        self.cache.invalidate(req.pool_id);
        drop(guard);

        let TradeCommit {
            pool, transaction, ..
        } = commit;

        tracing::info!(
            pool_id = %pool.id,
            tx_hash = %transaction.tx_hash,
            side = %transaction.side,
            token_amount = %transaction.token_amount,
            usdt_amount = %transaction.usdt_amount,
            price = %pool.metrics.price_realtime,
            approximate = transaction.approximate,
            "Trade applied"
        );

        self.notifier.dispatch(vec![
            TradeEvent::Snapshot(PoolSnapshot::from(&pool)),
            TradeEvent::Trade(transaction.clone()),
        ]);

        Ok(TradeOutcome {
            transaction,
            duplicate: false,
            faults,
        })
    }

    fn validate_amounts(&self, req: &TradeRequest) -> Result<(), LedgerError> {
        let (input, output) = match req.side {
            TradeSide::Buy => (&req.usdt_amount, &req.token_amount),
            TradeSide::Sell => (&req.token_amount, &req.usdt_amount),
        };
        if !money::is_positive(input) {
            return Err(LedgerError::InvalidAmount(match req.side {
                TradeSide::Buy => "usdt_amount",
                TradeSide::Sell => "token_amount",
            }));
        }
        // the output side is recomputed under curve_recompute
        if self.amount_policy == AmountPolicy::ConfirmedDeltas && !money::is_positive(output) {
            return Err(LedgerError::InvalidAmount(match req.side {
                TradeSide::Buy => "token_amount",
                TradeSide::Sell => "usdt_amount",
            }));
        }
        Ok(())
    }

    fn replay(existing: TransactionRecord, pool_id: PoolId) -> Result<TradeOutcome, LedgerError> {
        if existing.pool_id != pool_id {
            return Err(LedgerError::TxHashConflict {
                tx_hash: existing.tx_hash,
                pool_id: existing.pool_id,
            });
        }
        tracing::debug!(
            target: TRADE_TARGET,
            tx_hash = %existing.tx_hash,
            "Duplicate submission, returning recorded result"
        );
        Ok(TradeOutcome {
            transaction: existing,
            duplicate: true,
            faults: Vec::new(),
        })
    }

    /// Build the commit for `req`. Runs under the pool lock; reads only.
    async fn prepare(
        &self,
        req: &TradeRequest,
    ) -> Result<(TradeCommit, Vec<ConsistencyFault>), LedgerError> {
        let pool = self.load_pool(req.pool_id).await?;
        if pool.is_graduated() {
            return Err(LedgerError::PoolGraduated(pool.id));
        }
        if &req.wallet == pool.curve_holder() {
            return Err(LedgerError::InvalidWallet(req.wallet.clone()));
        }

        let amounts = self.resolve_amounts(&pool, req)?;

        let reserves = ReserveLedger::apply(&pool, req.side, &amounts.token, &amounts.usdt);

        let curve_balance = self
            .store
            .get_holder_balance(pool.id, pool.curve_holder())
            .await?
            .unwrap_or_else(BigDecimal::zero);
        let wallet_balance = self.store.get_holder_balance(pool.id, &req.wallet).await?;
        let holders = HolderLedger::apply(
            pool.curve_holder(),
            &curve_balance,
            &req.wallet,
            wallet_balance.as_ref(),
            req.side,
            &amounts.token,
        );

        let mut faults = reserves.faults;
        faults.extend(holders.faults);
        self.apply_consistency_policy(&pool, req, &faults)?;

        let now = Utc::now();
        let timestamp = req.timestamp.unwrap_or(now);
        let mut next = reserves.pool;
        next.metrics = self.metrics.derive_metrics(&next);
        next.version = pool.version + 1;
        next.updated_at = now;
        next.price_change_24h = self
            .rolling_price_change(&pool, &next.metrics.price_realtime, timestamp)
            .await;

        tracing::debug!(
            target: TRADE_TARGET,
            tx_hash = %req.tx_hash,
            spot_before = %self.pricing.spot_price(&pool),
            spot_after = %self.pricing.spot_price(&next),
            "Curve moved"
        );

        let transaction = TransactionRecord {
            id: TransactionId::new(),
            pool_id: pool.id,
            side: req.side,
            tx_hash: req.tx_hash.clone(),
            wallet: req.wallet.clone(),
            token_amount: amounts.token,
            usdt_amount: amounts.usdt,
            fee_amount: amounts.fee,
            price_impact: amounts.price_impact,
            approximate: amounts.approximate,
            effective_token_before: pool.effective_reserve_token(),
            effective_usdt_before: pool.effective_reserve_usdt(),
            effective_token_after: next.effective_reserve_token(),
            effective_usdt_after: next.effective_reserve_usdt(),
            price_before: pool.metrics.price_realtime.clone(),
            metrics_after: next.metrics.clone(),
            timestamp,
        };

        let commit = TradeCommit {
            pool: next,
            expected_version: pool.version,
            transaction,
            holder_writes: holders.writes,
        };
        Ok((commit, faults))
    }

    /// Quote the trade and pick the amounts the ledger will move.
    fn resolve_amounts(
        &self,
        pool: &Pool,
        req: &TradeRequest,
    ) -> Result<TradeAmounts, LedgerError> {
        let recompute = self.amount_policy == AmountPolicy::CurveRecompute;
        match req.side {
            TradeSide::Buy => {
                let quote = self.pricing.quote_buy(pool, &req.usdt_amount)?;
                Ok(TradeAmounts {
                    token: if recompute {
                        quote.tokens_out
                    } else {
                        req.token_amount.clone()
                    },
                    usdt: req.usdt_amount.clone(),
                    fee: quote.fee,
                    price_impact: quote.price_impact,
                    approximate: quote.approximate,
                })
            }
            TradeSide::Sell => {
                let quote = self.pricing.quote_sell(pool, &req.token_amount)?;
                Ok(TradeAmounts {
                    token: req.token_amount.clone(),
                    usdt: if recompute {
                        quote.usdt_out
                    } else {
                        req.usdt_amount.clone()
                    },
                    fee: quote.fee,
                    price_impact: quote.price_impact,
                    approximate: quote.approximate,
                })
            }
        }
    }

    fn apply_consistency_policy(
        &self,
        pool: &Pool,
        req: &TradeRequest,
        faults: &[ConsistencyFault],
    ) -> Result<(), LedgerError> {
        if faults.is_empty() {
            return Ok(());
        }

        if self.consistency_policy == ConsistencyPolicy::Reject {
            let detail = faults
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            tracing::warn!(
                target: AUDIT_TARGET,
                pool_id = %pool.id,
                tx_hash = %req.tx_hash,
                "Trade rejected on consistency fault: {}", detail
            );
            return Err(LedgerError::ConsistencyFault(detail));
        }

        for fault in faults {
            tracing::warn!(
                target: AUDIT_TARGET,
                pool_id = %pool.id,
                tx_hash = %req.tx_hash,
                balance = fault.kind.as_str(),
                requested = %fault.requested,
                "Balance clamped at zero"
            );
        }
        Ok(())
    }

    /// Percent change over the rolling window ending at `timestamp`.
    ///
    /// The base is the pre-trade price of the oldest trade inside the window,
    /// this one included. Runs under the pool lock so the value commits with
    /// the trade. A failed lookup keeps the previous value and never aborts
    /// the trade.
    async fn rolling_price_change(
        &self,
        pool: &Pool,
        price_after: &BigDecimal,
        timestamp: DateTime<Utc>,
    ) -> Option<BigDecimal> {
        let since = timestamp - self.price_window;
        let base = match self.store.earliest_transaction_since(pool.id, since).await {
            Ok(Some(first)) if first.timestamp <= timestamp => first.price_before,
            // nothing older inside the window: this trade opens it
            Ok(_) => pool.metrics.price_realtime.clone(),
            Err(e) => {
                tracing::warn!(
                    pool_id = %pool.id,
                    "Price change lookup failed, keeping previous value: {}", e
                );
                return pool.price_change_24h.clone();
            }
        };
        self.price_change(&base, price_after)
    }

    /// Percent change from `base` to `current`; `None` without a base price.
    fn price_change(&self, base: &BigDecimal, current: &BigDecimal) -> Option<BigDecimal> {
        if !money::is_positive(base) {
            return None;
        }
        money::div(&(current - base), base, self.pricing.precision())
            .ok()
            .map(|ratio| ratio * BigDecimal::from(100))
    }

    // ========================================================================
    // Reporting reads
    // ========================================================================

    pub async fn pool(&self, pool_id: PoolId) -> Result<Pool, LedgerError> {
        if let Some(pool) = self.cache.get(pool_id) {
            return Ok(pool);
        }
        let generation = self.cache.generation(pool_id);
        let pool = self.load_pool(pool_id).await?;
        self.cache.put(&pool, generation);
        Ok(pool)
    }

    pub async fn pool_by_token(&self, token: &Address) -> Result<Option<Pool>, LedgerError> {
        self.store.get_pool_by_token(token).await
    }

    /// Holders, largest balance first
    pub async fn holders(&self, pool_id: PoolId) -> Result<Vec<Holder>, LedgerError> {
        self.store.list_holders(pool_id).await
    }

    /// Most recent transactions first
    pub async fn transactions(
        &self,
        pool_id: PoolId,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        self.store.list_transactions(pool_id, limit).await
    }

    pub async fn transaction(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        self.store.get_transaction(tx_hash).await
    }

    async fn load_pool(&self, pool_id: PoolId) -> Result<Pool, LedgerError> {
        self.store
            .get_pool(pool_id)
            .await?
            .ok_or(LedgerError::PoolNotFound(pool_id))
    }
}

fn transition(state: &mut TradeState, next: TradeState, tx_hash: &TxHash) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal trade transition {} -> {}",
        state,
        next
    );
    tracing::trace!(target: TRADE_TARGET, %tx_hash, from = %state, to = %next);
    *state = next;
}
