//! Curve Ledger - bonding-curve reserve/pricing engine and transaction ledger
//!
//! Prices buys and sells against a constant-product curve with virtual
//! reserves, applies confirmed on-chain trades to per-pool reserves and
//! holder balances exactly once, and derives display metrics.
//!
//! # Modules
//!
//! - [`core_types`] - Identifiers (PoolId, Address, TxHash, ...)
//! - [`money`] - Arbitrary-precision amount helpers
//! - [`fee`] - Trade fee rate
//! - [`pool`] - Pool record, reserve and holder ledgers
//! - [`pricing`] - Constant-product quotes
//! - [`metrics`] - Price, market cap and curve progress
//! - [`ledger`] - Transaction recorder, idempotency, notifications
//! - [`store`] - Persistence (in-memory and PostgreSQL)
//! - [`db`] - PostgreSQL connection pool
//! - [`config`] / [`logging`] - Ambient setup
//! - [`csv_io`] - Replay input/output

// Core types - must be first!
pub mod core_types;

pub mod fee;
pub mod money;

// Curve components
pub mod metrics;
pub mod pool;
pub mod pricing;

// Ledger and persistence
pub mod db;
pub mod ledger;
pub mod store;

pub mod config;
pub mod csv_io;
pub mod logging;

// Convenient re-exports at crate root
pub use core_types::{Address, PoolId, TransactionId, TxHash};
pub use fee::FeeRate;
pub use ledger::{
    GraduationOutcome, LedgerError, TradeOutcome, TradeRequest, TradeSide, TransactionRecord,
    TransactionRecorder,
};
pub use metrics::{MarketCapPolicy, MetricsDeriver};
pub use pool::{Holder, NewPool, Pool, PoolMetrics, PoolStatus};
pub use pricing::{BuyQuote, PricingEngine, PricingError, SellQuote};
pub use store::{LedgerStore, MemoryStore, PgLedgerStore};
