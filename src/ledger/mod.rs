//! Curve Ledger - applies confirmed bonding-curve trades exactly once
//!
//! # Architecture
//!
//! ```text
//! ingestion ──► TransactionRecorder ──► PricingEngine (quote)
//!                      │                ReserveLedger / HolderLedger (deltas)
//!                      │                MetricsDeriver
//!                      ▼
//!                 LedgerStore (atomic commit, tx_hash unique)
//!                      │
//!                      └──► TradeNotifier (spawned, retried)
//! ```
//!
//! # Key Invariants
//!
//! 1. A `tx_hash` mutates the ledger at most once
//! 2. `sum(holder balances) == total_supply` per pool
//! 3. Reserves and AMM-side balances never go negative
//! 4. A trade either fully commits or leaves no trace

pub mod cache;
pub mod error;
pub mod locks;
pub mod notifier;
pub mod recorder;
pub mod state;
pub mod types;

pub use cache::PoolSnapshotCache;
pub use error::LedgerError;
pub use locks::PoolLocks;
pub use notifier::{
    NoopNotifier, NotifyDispatcher, NotifyError, PoolSnapshot, QueueNotifier, TradeEvent,
    TradeNotifier,
};
pub use recorder::TransactionRecorder;
pub use state::TradeState;
pub use types::{
    AmountPolicy, ConsistencyFault, ConsistencyPolicy, FaultKind, GraduationOutcome,
    TradeOutcome, TradeRequest, TradeSide, TransactionRecord,
};
