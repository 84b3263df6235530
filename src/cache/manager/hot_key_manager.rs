//! Hot-key set lifecycle
//!
//! The set is an immutable `HashSet` behind an `ArcSwap`. Readers load the
//! current snapshot without locking; writers build a replacement under a single
//! mutex and publish it in one store, so no reader ever sees a half-applied
//! change. Demotion purges each removed key's storage entry and refresh
//! registration while the writer lock is still held.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;

use crate::cache::refresh::RefreshRegistry;
use crate::cache::traits::storage::HotKeyStorage;
use crate::cache::worker::access_pool::AccessWorkerPool;

/// Immutable hot-key snapshot
pub type HotKeySet = HashSet<String>;

/// Owner of the authoritative hot-key set
pub struct HotKeyManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    hot_keys: ArcSwap<HotKeySet>,
    writer: Mutex<()>,
    version: AtomicU64,
    pool: AccessWorkerPool,
    storage: Arc<dyn HotKeyStorage<V>>,
    registry: Arc<RefreshRegistry<V>>,
}

impl<V> HotKeyManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        pool: AccessWorkerPool,
        storage: Arc<dyn HotKeyStorage<V>>,
        registry: Arc<RefreshRegistry<V>>,
    ) -> Self {
        Self {
            hot_keys: ArcSwap::new(Arc::new(HotKeySet::new())),
            writer: Mutex::new(()),
            version: AtomicU64::new(0),
            pool,
            storage,
            registry,
        }
    }

    /// Hand the access to the recording pool; never blocks on a full queue
    #[inline]
    pub fn record_access(&self, key: &str) {
        self.pool.submit(key);
    }

    #[inline]
    pub fn is_hot_key(&self, key: &str) -> bool {
        self.hot_keys.load().contains(key)
    }

    /// Current snapshot
    #[inline]
    pub fn hot_keys(&self) -> Arc<HotKeySet> {
        self.hot_keys.load_full()
    }

    #[inline]
    pub fn hot_key_count(&self) -> usize {
        self.hot_keys.load().len()
    }

    /// Number of snapshots published so far
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    #[inline]
    pub fn pool(&self) -> &AccessWorkerPool {
        &self.pool
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn publish(&self, next: HotKeySet) {
        self.hot_keys.store(Arc::new(next));
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Add `keys` to the hot set; returns how many were new
    pub fn promote(&self, keys: &[String]) -> usize {
        if keys.is_empty() {
            return 0;
        }
        let _writer = self.lock_writer();
        let current = self.hot_keys.load_full();
        let added: Vec<&String> = keys.iter().filter(|key| !current.contains(*key)).collect();
        if added.is_empty() {
            log::trace!("Promotion left hot-key set unchanged");
            return 0;
        }

        let mut next = HotKeySet::clone(&current);
        next.extend(added.iter().map(|key| (*key).clone()));
        let count = next.len() - current.len();
        self.publish(next);
        log::debug!("Promoted {} keys: {:?}", count, added);
        count
    }

    /// Remove `keys` from the hot set and purge their cached state
    pub fn demote(&self, keys: &[String]) -> usize {
        if keys.is_empty() {
            return 0;
        }
        let _writer = self.lock_writer();
        let current = self.hot_keys.load_full();
        let removed: Vec<&String> = keys.iter().filter(|key| current.contains(*key)).collect();
        if removed.is_empty() {
            log::trace!("Demotion left hot-key set unchanged");
            return 0;
        }

        let mut next = HotKeySet::clone(&current);
        for key in &removed {
            next.remove(*key);
        }
        let count = current.len() - next.len();
        self.publish(next);

        // Unregister first so an in-flight refresh sees the key is gone
        for key in &removed {
            self.registry.remove(key);
            if let Err(e) = self.storage.remove(key) {
                log::warn!("Failed to remove demoted key {} from storage: {}", key, e);
            }
        }
        log::debug!("Demoted {} keys: {:?}", count, removed);
        count
    }

    /// Stop the recording pool
    pub fn shutdown(&self) -> bool {
        self.pool.shutdown()
    }
}

impl<V> std::fmt::Debug for HotKeyManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotKeyManager")
            .field("hot_keys", &self.hot_key_count())
            .field("version", &self.version())
            .field("pool", &self.pool)
            .finish()
    }
}
