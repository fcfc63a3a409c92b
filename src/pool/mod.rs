//! Pool state: the reserve record, its holder map and their pure update rules.
//!
//! Nothing in this module performs I/O. The recorder feeds the updates
//! produced here to a [`crate::store::LedgerStore`] as one atomic commit.

pub mod holders;
pub mod reserves;
pub mod types;

pub use holders::{Holder, HolderLedger, HolderUpdate, HolderWrite};
pub use reserves::{ReserveLedger, ReserveUpdate};
pub use types::{NewPool, Pool, PoolMetrics, PoolStatus};
