//! Lock-free hit-rate and QPS statistics
//!
//! Monotonic totals never reset on their own. Windowed counters feed the rate
//! figures and are rolled over by whichever thread first sees the window
//! expired: that thread wins a CAS on the `resetting` flag, re-checks expiry,
//! and resets. Losers carry on without waiting, so an increment racing the
//! reset may land in the window being discarded. That loss is accepted.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;
use dashmap::DashMap;
use serde::Serialize;

use crate::cache::config::MonitorConfig;
use crate::cache::types::clock::SharedClock;

/// Point-in-time view of the hit-rate statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HitRateSnapshot {
    pub total_wrap_get_count: u64,
    pub hot_key_access_count: u64,
    pub hot_key_hit_count: u64,
    pub hot_key_miss_count: u64,
    pub window_wrap_get_count: u64,
    pub window_hot_key_access_count: u64,
    pub window_hot_key_hit_count: u64,
    pub window_hot_key_miss_count: u64,
    pub distinct_key_count: usize,
    pub wrap_get_qps: f64,
    pub hot_key_access_qps: f64,
    pub hot_key_hit_qps: f64,
    pub hot_key_miss_qps: f64,
    pub keys_per_second: f64,
    /// Hits over hits plus misses, 0 before any hot access
    pub hit_rate: f64,
    /// Hot-key accesses over all wrapped gets
    pub traffic_ratio: f64,
}

/// Windowed counters for read-path observability
#[derive(Debug)]
pub struct HitRateStatistics {
    clock: SharedClock,
    window_ms: u64,
    cleanup_interval_ms: u64,
    max_window_keys: usize,

    total_wrap_get: CachePadded<AtomicU64>,
    total_hot_access: CachePadded<AtomicU64>,
    total_hit: CachePadded<AtomicU64>,
    total_miss: CachePadded<AtomicU64>,

    window_wrap_get: CachePadded<AtomicU64>,
    window_hot_access: CachePadded<AtomicU64>,
    window_hit: CachePadded<AtomicU64>,
    window_miss: CachePadded<AtomicU64>,
    window_start: CachePadded<AtomicU64>,
    resetting: AtomicBool,

    /// Distinct keys seen this window, key to last-seen millis
    window_keys: DashMap<String, u64>,
    window_key_count: AtomicUsize,
    last_cleanup: AtomicU64,
    cleaning: AtomicBool,
}

impl HitRateStatistics {
    pub fn new(config: &MonitorConfig, clock: SharedClock) -> Self {
        let now = clock.now_millis();
        Self {
            clock,
            window_ms: config.window_ms.max(1),
            cleanup_interval_ms: config.cleanup_interval_ms,
            max_window_keys: config.max_window_keys,
            total_wrap_get: CachePadded::new(AtomicU64::new(0)),
            total_hot_access: CachePadded::new(AtomicU64::new(0)),
            total_hit: CachePadded::new(AtomicU64::new(0)),
            total_miss: CachePadded::new(AtomicU64::new(0)),
            window_wrap_get: CachePadded::new(AtomicU64::new(0)),
            window_hot_access: CachePadded::new(AtomicU64::new(0)),
            window_hit: CachePadded::new(AtomicU64::new(0)),
            window_miss: CachePadded::new(AtomicU64::new(0)),
            window_start: CachePadded::new(AtomicU64::new(now)),
            resetting: AtomicBool::new(false),
            window_keys: DashMap::new(),
            window_key_count: AtomicUsize::new(0),
            last_cleanup: AtomicU64::new(now),
            cleaning: AtomicBool::new(false),
        }
    }

    /// Record one wrapped get for `key`
    pub fn record_wrap_get(&self, key: &str) {
        let now = self.clock.now_millis();
        self.roll_window_if_expired(now);
        self.total_wrap_get.fetch_add(1, Ordering::Relaxed);
        self.window_wrap_get.fetch_add(1, Ordering::Relaxed);
        self.track_key(key, now);
        self.maybe_cleanup(now);
    }

    #[inline]
    pub fn record_hot_key_access(&self) {
        self.roll_window_if_expired(self.clock.now_millis());
        self.total_hot_access.fetch_add(1, Ordering::Relaxed);
        self.window_hot_access.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_hit(&self) {
        self.roll_window_if_expired(self.clock.now_millis());
        self.total_hit.fetch_add(1, Ordering::Relaxed);
        self.window_hit.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.roll_window_if_expired(self.clock.now_millis());
        self.total_miss.fetch_add(1, Ordering::Relaxed);
        self.window_miss.fetch_add(1, Ordering::Relaxed);
    }

    fn roll_window_if_expired(&self, now: u64) {
        let start = self.window_start.load(Ordering::Acquire);
        if now.saturating_sub(start) < self.window_ms {
            return;
        }
        if self
            .resetting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        // Double-check: the previous winner may have rolled already
        let start = self.window_start.load(Ordering::Acquire);
        if now.saturating_sub(start) >= self.window_ms {
            self.reset_window(now);
        }
        self.resetting.store(false, Ordering::Release);
    }

    fn reset_window(&self, now: u64) {
        self.window_wrap_get.store(0, Ordering::Relaxed);
        self.window_hot_access.store(0, Ordering::Relaxed);
        self.window_hit.store(0, Ordering::Relaxed);
        self.window_miss.store(0, Ordering::Relaxed);
        self.window_keys.clear();
        self.window_key_count.store(0, Ordering::Relaxed);
        self.window_start.store(now, Ordering::Release);
    }

    fn track_key(&self, key: &str, now: u64) {
        if let Some(mut seen) = self.window_keys.get_mut(key) {
            *seen = now;
            return;
        }
        if !self.reserve_key_slot() {
            // Full: purge stale keys if due, then give up on this key
            self.maybe_cleanup(now);
            if !self.reserve_key_slot() {
                return;
            }
        }
        if self.window_keys.insert(key.to_string(), now).is_some() {
            // Lost an insert race for the same key; release the extra slot
            self.release_key_slots(1);
        }
    }

    /// Saturates at zero; a window reset may already have cleared the count
    #[inline]
    fn release_key_slots(&self, released: usize) {
        let _ = self
            .window_key_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                Some(count.saturating_sub(released))
            });
    }

    #[inline]
    fn reserve_key_slot(&self) -> bool {
        self.window_key_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < self.max_window_keys).then_some(count + 1)
            })
            .is_ok()
    }

    fn maybe_cleanup(&self, now: u64) {
        let last = self.last_cleanup.load(Ordering::Acquire);
        if now.saturating_sub(last) < self.cleanup_interval_ms {
            return;
        }
        if self
            .last_cleanup
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        self.cleanup_expired_keys(now);
    }

    /// Drop distinct keys not seen within one window; single-flight
    pub fn cleanup_expired_keys(&self, now: u64) -> usize {
        if self
            .cleaning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return 0;
        }
        let cutoff = now.saturating_sub(self.window_ms);
        let mut removed = 0;
        self.window_keys.retain(|_, seen| {
            let keep = *seen >= cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });
        self.release_key_slots(removed);
        self.cleaning.store(false, Ordering::Release);
        if removed > 0 {
            log::trace!("Purged {} expired distinct keys", removed);
        }
        removed
    }

    #[inline]
    pub fn distinct_key_count(&self) -> usize {
        self.window_key_count.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> HitRateSnapshot {
        let now = self.clock.now_millis();
        let elapsed_ms = now
            .saturating_sub(self.window_start.load(Ordering::Acquire))
            .max(1) as f64;
        let per_second = |count: u64| count as f64 * 1_000.0 / elapsed_ms;

        let total_wrap_get = self.total_wrap_get.load(Ordering::Relaxed);
        let total_hot_access = self.total_hot_access.load(Ordering::Relaxed);
        let total_hit = self.total_hit.load(Ordering::Relaxed);
        let total_miss = self.total_miss.load(Ordering::Relaxed);
        let window_wrap_get = self.window_wrap_get.load(Ordering::Relaxed);
        let window_hot_access = self.window_hot_access.load(Ordering::Relaxed);
        let window_hit = self.window_hit.load(Ordering::Relaxed);
        let window_miss = self.window_miss.load(Ordering::Relaxed);
        let distinct = self.distinct_key_count();

        let lookups = total_hit + total_miss;
        HitRateSnapshot {
            total_wrap_get_count: total_wrap_get,
            hot_key_access_count: total_hot_access,
            hot_key_hit_count: total_hit,
            hot_key_miss_count: total_miss,
            window_wrap_get_count: window_wrap_get,
            window_hot_key_access_count: window_hot_access,
            window_hot_key_hit_count: window_hit,
            window_hot_key_miss_count: window_miss,
            distinct_key_count: distinct,
            wrap_get_qps: per_second(window_wrap_get),
            hot_key_access_qps: per_second(window_hot_access),
            hot_key_hit_qps: per_second(window_hit),
            hot_key_miss_qps: per_second(window_miss),
            keys_per_second: per_second(distinct as u64),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                total_hit as f64 / lookups as f64
            },
            traffic_ratio: if total_wrap_get == 0 {
                0.0
            } else {
                total_hot_access as f64 / total_wrap_get as f64
            },
        }
    }

    /// Zero every counter and start a new window
    pub fn reset(&self) {
        self.total_wrap_get.store(0, Ordering::Relaxed);
        self.total_hot_access.store(0, Ordering::Relaxed);
        self.total_hit.store(0, Ordering::Relaxed);
        self.total_miss.store(0, Ordering::Relaxed);
        self.reset_window(self.clock.now_millis());
    }
}
