//! Collaborator traits consumed by the hot-key core
//!
//! The core never owns cached values itself. It reads and writes them through a
//! [`HotKeyStorage`] implementation and obtains fresh values through a
//! caller-supplied [`FetchFn`].

use std::sync::Arc;

use super::types_and_enums::CacheOperationError;

/// Thin bounded value cache holding the values of hot keys
pub trait HotKeyStorage<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// Get the cached value for `key`
    fn get(&self, key: &str) -> Option<V>;

    /// Insert or replace the value for `key`
    fn put(&self, key: &str, value: V) -> Result<(), CacheOperationError>;

    /// Remove `key` from the cache
    fn remove(&self, key: &str) -> Result<(), CacheOperationError>;

    /// Number of cached entries
    fn size(&self) -> u64;
}

/// Fetch-from-source callback registered per hot key
///
/// `Ok(None)` means the source has no value; absent values are never cached.
pub type FetchFn<V> = Arc<dyn Fn(&str) -> Result<Option<V>, CacheOperationError> + Send + Sync>;
