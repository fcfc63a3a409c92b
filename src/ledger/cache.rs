//! TTL cache of pool snapshots for reporting reads.
//!
//! Uses the `cached` crate's `TimedCache` for expiry. Every invalidation
//! bumps a per-pool generation; a reader records the generation before it
//! loads from the store and its `put` is dropped if a commit invalidated the
//! pool in between. A snapshot loaded before a local commit therefore never
//! lands in the cache after it. The TTL only bounds staleness against
//! writers in other processes.

use cached::{Cached, TimedCache};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::core_types::PoolId;
use crate::pool::Pool;

/// Default TTL in seconds
pub const DEFAULT_TTL_SECS: u64 = 5;

/// Invalidation count of a pool, read before a store load
pub type Generation = u64;

struct Slots {
    entries: TimedCache<PoolId, Pool>,
    generations: HashMap<PoolId, Generation>,
}

pub struct PoolSnapshotCache {
    /// `None` when caching is disabled (TTL 0)
    inner: Option<Mutex<Slots>>,
}

impl PoolSnapshotCache {
    pub fn new(ttl_secs: u64) -> Self {
        let inner = (ttl_secs > 0).then(|| {
            Mutex::new(Slots {
                entries: TimedCache::with_lifespan(ttl_secs),
                generations: HashMap::new(),
            })
        });
        Self { inner }
    }

    pub fn get(&self, pool_id: PoolId) -> Option<Pool> {
        let mut slots = self.inner.as_ref()?.lock().ok()?;
        slots.entries.cache_get(&pool_id).cloned()
    }

    pub fn generation(&self, pool_id: PoolId) -> Generation {
        self.inner
            .as_ref()
            .and_then(|m| m.lock().ok())
            .and_then(|slots| slots.generations.get(&pool_id).copied())
            .unwrap_or(0)
    }

    /// Store a snapshot loaded at `generation`. Returns false (and stores
    /// nothing) when the pool was invalidated since.
    pub fn put(&self, pool: &Pool, generation: Generation) -> bool {
        let Some(Ok(mut slots)) = self.inner.as_ref().map(|m| m.lock()) else {
            return false;
        };
        let current = slots.generations.get(&pool.id).copied().unwrap_or(0);
        if current != generation {
            return false;
        }
        slots.entries.cache_set(pool.id, pool.clone());
        true
    }

    pub fn invalidate(&self, pool_id: PoolId) {
        if let Some(Ok(mut slots)) = self.inner.as_ref().map(|m| m.lock()) {
            *slots.generations.entry(pool_id).or_insert(0) += 1;
            slots.entries.cache_remove(&pool_id);
        }
    }
}

impl Default for PoolSnapshotCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Address;
    use crate::fee::FeeRate;
    use crate::pool::NewPool;
    use bigdecimal::{BigDecimal, Zero};
    use chrono::Utc;

    fn pool() -> Pool {
        Pool::mint(
            NewPool {
                token_address: Address::parse("0x8888888888888888888888888888888888888888")
                    .unwrap(),
                virtual_reserve_token: BigDecimal::from(1000),
                virtual_reserve_usdt: BigDecimal::from(100),
                initial_reserve_token: BigDecimal::zero(),
                total_supply: BigDecimal::from(800),
                trade_fee: FeeRate::zero(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_put_get_invalidate() {
        let cache = PoolSnapshotCache::new(60);
        let p = pool();
        assert!(cache.get(p.id).is_none());

        assert!(cache.put(&p, cache.generation(p.id)));
        assert_eq!(cache.get(p.id), Some(p.clone()));

        cache.invalidate(p.id);
        assert!(cache.get(p.id).is_none());
    }

    #[test]
    fn test_zero_ttl_disables() {
        let cache = PoolSnapshotCache::new(0);
        let p = pool();
        assert!(!cache.put(&p, cache.generation(p.id)));
        assert!(cache.get(p.id).is_none());
    }

    #[test]
    fn test_put_after_invalidate_is_dropped() {
        let cache = PoolSnapshotCache::new(60);
        let before = pool();
        let seen = cache.generation(before.id);

        // a commit lands between the reader's load and its put
        let mut after = before.clone();
        after.version += 1;
        cache.invalidate(before.id);

        assert!(!cache.put(&before, seen));
        assert!(cache.get(before.id).is_none());

        assert!(cache.put(&after, cache.generation(after.id)));
        assert_eq!(cache.get(after.id).map(|p| p.version), Some(after.version));
    }
}
