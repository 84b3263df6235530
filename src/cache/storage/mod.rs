//! Default local value cache for hot keys
//!
//! A bounded synchronous moka cache with expire-after-write. Any other
//! [`HotKeyStorage`] implementation can be injected through the builder.

use std::time::Duration;

use moka::sync::Cache;

use crate::cache::config::StorageConfig;
use crate::cache::traits::storage::HotKeyStorage;
use crate::cache::traits::types_and_enums::CacheOperationError;

/// Bounded LRU-style cache with write TTL
pub struct MokaStorage<V>
where
    V: Clone + Send + Sync + 'static,
{
    cache: Cache<String, V>,
}

impl<V> MokaStorage<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(max_capacity: u64, time_to_live: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(time_to_live)
            .build();
        Self { cache }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.maximum_size, config.expire_after_write())
    }
}

impl<V> HotKeyStorage<V> for MokaStorage<V>
where
    V: Clone + Send + Sync + 'static,
{
    #[inline]
    fn get(&self, key: &str) -> Option<V> {
        self.cache.get(key)
    }

    fn put(&self, key: &str, value: V) -> Result<(), CacheOperationError> {
        self.cache.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheOperationError> {
        self.cache.invalidate(key);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl<V> std::fmt::Debug for MokaStorage<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaStorage")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}
