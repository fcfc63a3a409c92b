//! Per-pool mutation lock registry.
//!
//! Each pool gets its own async mutex, created on first use and kept in a
//! DashMap. Trades against one pool queue up behind each other; trades against
//! different pools never contend.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core_types::PoolId;

#[derive(Default)]
pub struct PoolLocks {
    locks: DashMap<PoolId, Arc<Mutex<()>>>,
}

impl PoolLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `pool_id`.
    ///
    /// The shard guard is dropped before awaiting, so waiting on one pool
    /// never blocks lookups for another.
    pub async fn acquire(&self, pool_id: PoolId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(pool_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Number of pools that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
