//! Two-tier frequency recorder
//!
//! Unseen keys land in a cheap staging counter. Once a key's staged count
//! crosses the promotion threshold it moves, count and all, into a full
//! [`AccessWindow`]. A key is never present in both tiers: the move happens while
//! the key's staging shard is locked, and every staging insert re-checks the
//! window map under that same lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::access_window::AccessWindow;
use super::sampler::{AdmissionSampler, SamplerSnapshot};
use super::statistics::{KEY_SAMPLE_SIZE, RecorderStatistics, average_key_length};
use crate::cache::config::HotKeyConfig;
use crate::cache::types::clock::SharedClock;

/// Fraction of capacity kept by capacity-triggered cleanup
pub const RETAIN_RATIO: f64 = 0.8;

/// Staging size is checked against its cap every this many new staging entries
const STAGING_CHECK_EVERY: u64 = 1024;

/// Result of one cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Another cleanup was already running
    pub skipped: bool,
    pub expired: usize,
    pub evicted: usize,
    pub staging_trimmed: usize,
}

/// Resets the single-flight flag even if a cleanup step panics
struct CleanupGuard<'a>(&'a AtomicBool);

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sliding-window access frequency recorder with admission sampling
#[derive(Debug)]
pub struct FrequencyRecorder {
    config: Arc<HotKeyConfig>,
    clock: SharedClock,
    windows: DashMap<String, AccessWindow>,
    staging: DashMap<String, u64>,
    staging_len: AtomicUsize,
    staging_inserts: AtomicU64,
    sampler: AdmissionSampler,
    promotion_threshold: u64,
    cleaning: AtomicBool,
}

impl FrequencyRecorder {
    pub fn new(config: Arc<HotKeyConfig>, clock: SharedClock) -> Self {
        let now = clock.now_millis();
        let sampler =
            AdmissionSampler::new(config.admission.clone(), config.detection.window_ms(), now);
        let promotion_threshold = config.staging_promotion_threshold().max(1);
        Self {
            config,
            clock,
            windows: DashMap::new(),
            staging: DashMap::new(),
            staging_len: AtomicUsize::new(0),
            staging_inserts: AtomicU64::new(0),
            sampler,
            promotion_threshold,
            cleaning: AtomicBool::new(false),
        }
    }

    /// Record one access to `key`
    pub fn record_access(&self, key: &str) {
        let now = self.clock.now_millis();
        if let Some(window) = self.windows.get(key) {
            window.record(now);
            return;
        }

        if self.config.admission.enabled {
            let staged = self.staging.get(key).map(|count| *count).unwrap_or(0);
            let decision = self
                .sampler
                .admit(key, staged, self.staging_utilization(), now);
            if !decision.is_admitted() {
                return;
            }
        }

        self.stage(key, now);
    }

    fn stage(&self, key: &str, now: u64) {
        let mut counted = false;
        if let Some(mut count) = self.staging.get_mut(key) {
            *count += 1;
            if *count < self.promotion_threshold {
                return;
            }
            counted = true;
        }

        match self.staging.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if !counted {
                    *entry.get_mut() += 1;
                }
                let staged = *entry.get();
                if staged >= self.promotion_threshold {
                    // Window goes in before the staging entry's lock is released
                    self.open_window(entry.key().clone(), staged, now);
                    entry.remove();
                    self.staging_len.fetch_sub(1, Ordering::Relaxed);
                }
            }
            Entry::Vacant(entry) => {
                // Promoted by another thread between the two lookups
                if let Some(window) = self.windows.get(key) {
                    window.record(now);
                    return;
                }
                if self.promotion_threshold <= 1 {
                    self.open_window(key.to_string(), 1, now);
                    return;
                }
                entry.insert(1);
                self.staging_len.fetch_add(1, Ordering::Relaxed);
                if self.staging_inserts.fetch_add(1, Ordering::Relaxed) % STAGING_CHECK_EVERY == 0
                    && self.staging_len.load(Ordering::Relaxed)
                        > self.config.recorder.max_staging_capacity
                {
                    log::debug!("Staging table over capacity, trimming");
                    self.cleanup();
                }
            }
        }
    }

    fn open_window(&self, key: String, staged: u64, now: u64) {
        let window_ms = self.config.detection.window_ms();
        self.windows
            .entry(key)
            .or_insert_with(|| AccessWindow::with_count(staged, now, window_ms));
    }

    #[inline]
    fn staging_utilization(&self) -> f64 {
        self.staging_len.load(Ordering::Relaxed) as f64
            / self.config.recorder.max_staging_capacity.max(1) as f64
    }

    /// Current QPS of every windowed key, recomputed on read
    pub fn get_statistics(&self) -> HashMap<String, f64> {
        let now = self.clock.now_millis();
        self.windows
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().qps(now)))
            .collect()
    }

    /// Keys whose QPS is at or above `threshold`
    pub fn get_hot_keys(&self, threshold: f64) -> HashMap<String, f64> {
        let now = self.clock.now_millis();
        self.windows
            .iter()
            .filter_map(|entry| {
                let qps = entry.value().qps(now);
                (qps >= threshold).then(|| (entry.key().clone(), qps))
            })
            .collect()
    }

    /// QPS of one key, `None` when the key has no window
    pub fn qps(&self, key: &str) -> Option<f64> {
        let now = self.clock.now_millis();
        self.windows.get(key).map(|window| window.qps(now))
    }

    /// Number of full access windows
    #[inline]
    pub fn size(&self) -> usize {
        self.windows.len()
    }

    #[inline]
    pub fn staging_size(&self) -> usize {
        self.staging.len()
    }

    #[inline]
    pub fn is_windowed(&self, key: &str) -> bool {
        self.windows.contains_key(key)
    }

    #[inline]
    pub fn is_staged(&self, key: &str) -> bool {
        self.staging.contains_key(key)
    }

    #[inline]
    pub fn promotion_threshold(&self) -> u64 {
        self.promotion_threshold
    }

    pub fn sampler_statistics(&self) -> SamplerSnapshot {
        self.sampler.snapshot()
    }

    pub fn statistics(&self) -> RecorderStatistics {
        let staging_size = self.staging.len();
        let window_size = self.windows.len();
        let mut sampled_keys: Vec<String> = self
            .windows
            .iter()
            .take(KEY_SAMPLE_SIZE)
            .map(|entry| entry.key().clone())
            .collect();
        sampled_keys.extend(
            self.staging
                .iter()
                .take(KEY_SAMPLE_SIZE)
                .map(|entry| entry.key().clone())
                .collect::<Vec<_>>(),
        );
        let avg = average_key_length(sampled_keys.iter().map(String::as_str));
        RecorderStatistics::new(staging_size, window_size, avg)
    }

    #[inline]
    pub fn estimated_memory_bytes(&self) -> u64 {
        self.statistics().total_memory_bytes
    }

    /// Reclaim memory; concurrent callers return immediately with `skipped`
    pub fn cleanup(&self) -> CleanupReport {
        if self
            .cleaning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return CleanupReport {
                skipped: true,
                ..CleanupReport::default()
            };
        }
        let _guard = CleanupGuard(&self.cleaning);

        let now = self.clock.now_millis();
        let report = CleanupReport {
            skipped: false,
            expired: self.expire_inactive(now),
            evicted: self.evict_over_capacity(now),
            staging_trimmed: self.trim_staging(),
        };
        if report.expired + report.evicted + report.staging_trimmed > 0 {
            log::debug!(
                "Recorder cleanup: expired={} evicted={} staging_trimmed={} remaining={}",
                report.expired,
                report.evicted,
                report.staging_trimmed,
                self.windows.len()
            );
        }
        report
    }

    fn expire_inactive(&self, now: u64) -> usize {
        let inactive_ms = self.config.recorder.inactive_expire_ms();
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now.saturating_sub(window.last_access()) <= inactive_ms);
        before.saturating_sub(self.windows.len())
    }

    fn evict_over_capacity(&self, now: u64) -> usize {
        let max = self.config.recorder.max_capacity;
        let size = self.windows.len();
        if size <= max {
            return 0;
        }
        let target = (max as f64 * RETAIN_RATIO).floor() as usize;
        let to_remove = size - target;
        let warm = self.config.detection.warm_qps_threshold;

        let mut all: Vec<(String, f64)> = self
            .windows
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().qps(now)))
            .collect();
        let cold_count = all.iter().filter(|(_, qps)| *qps < warm).count();
        if cold_count >= to_remove {
            all.retain(|(_, qps)| *qps < warm);
        }
        all.sort_by(|a, b| a.1.total_cmp(&b.1));

        all.iter()
            .take(to_remove)
            .filter(|(key, _)| self.windows.remove(key).is_some())
            .count()
    }

    fn trim_staging(&self) -> usize {
        let max = self.config.recorder.max_staging_capacity;
        let size = self.staging.len();
        if size <= max {
            return 0;
        }
        let target = (max as f64 * RETAIN_RATIO).floor() as usize;
        let mut counts: Vec<(String, u64)> = self
            .staging
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        counts.sort_by_key(|(_, count)| *count);

        let removed = counts
            .iter()
            .take(size - target)
            .filter(|(key, _)| self.staging.remove(key).is_some())
            .count();
        self.staging_len.fetch_sub(removed, Ordering::Relaxed);
        removed
    }
}
