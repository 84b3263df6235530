//! Cache refresh registry
//!
//! Holds one fetch callback per hot key and periodically re-fetches every
//! registered key into storage. Each callback runs isolated from the others:
//! an error, an absent value or a panic only bumps that key's failure count.
//! Keys that reach the configured failure limit are evicted from storage, the
//! registry and the failure map in one step.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;
use dashmap::DashMap;

use crate::cache::config::RefreshConfig;
use crate::cache::traits::storage::{FetchFn, HotKeyStorage};
use crate::cache::traits::types_and_enums::CacheOperationError;
use crate::cache::worker::scheduled_task::ScheduledTask;

/// Outcome of one refresh sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub failed: usize,
    /// Keys unregistered while their fetch ran
    pub skipped: usize,
    pub evicted: Vec<String>,
    /// Sweep stopped early by a forced shutdown
    pub cancelled: bool,
}

/// Lifetime registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RefreshSnapshot {
    pub registered: usize,
    pub sweeps: u64,
    pub refreshed: u64,
    pub failed: u64,
    pub evicted: u64,
}

/// Per-key fetch callbacks with scheduled refresh
pub struct RefreshRegistry<V>
where
    V: Clone + Send + Sync + 'static,
{
    config: RefreshConfig,
    storage: Arc<dyn HotKeyStorage<V>>,
    registrations: DashMap<String, FetchFn<V>>,
    failures: DashMap<String, u32>,
    task: Mutex<Option<ScheduledTask>>,
    cancelled: AtomicBool,
    sweeps: CachePadded<AtomicU64>,
    refreshed: CachePadded<AtomicU64>,
    failed: CachePadded<AtomicU64>,
    evicted: CachePadded<AtomicU64>,
}

enum FetchOutcome<V> {
    Value(V),
    Absent,
    Failed(String),
}

impl<V> RefreshRegistry<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: RefreshConfig, storage: Arc<dyn HotKeyStorage<V>>) -> Self {
        Self {
            config,
            storage,
            registrations: DashMap::new(),
            failures: DashMap::new(),
            task: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            sweeps: CachePadded::new(AtomicU64::new(0)),
            refreshed: CachePadded::new(AtomicU64::new(0)),
            failed: CachePadded::new(AtomicU64::new(0)),
            evicted: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Register `fetch` for `key`; the first registration wins
    ///
    /// Returns `true` when this call installed the callback.
    pub fn register(&self, key: &str, fetch: FetchFn<V>) -> bool {
        if key.is_empty() {
            return false;
        }
        if self.registrations.contains_key(key) {
            return false;
        }
        let mut installed = false;
        self.registrations.entry(key.to_string()).or_insert_with(|| {
            installed = true;
            fetch
        });
        installed
    }

    pub fn get(&self, key: &str) -> Option<FetchFn<V>> {
        self.registrations.get(key).map(|fetch| fetch.clone())
    }

    /// Drop the registration and failure count of `key`
    pub fn remove(&self, key: &str) -> bool {
        self.failures.remove(key);
        self.registrations.remove(key).is_some()
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.registrations.contains_key(key)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.registrations.len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.registrations
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn failure_count(&self, key: &str) -> u32 {
        self.failures.get(key).map(|count| *count).unwrap_or(0)
    }

    pub fn clear(&self) {
        self.registrations.clear();
        self.failures.clear();
    }

    fn fetch_isolated(key: &str, fetch: &FetchFn<V>) -> FetchOutcome<V> {
        match catch_unwind(AssertUnwindSafe(|| fetch(key))) {
            Ok(Ok(Some(value))) => FetchOutcome::Value(value),
            Ok(Ok(None)) => FetchOutcome::Absent,
            Ok(Err(e)) => FetchOutcome::Failed(e.to_string()),
            Err(_) => FetchOutcome::Failed("fetch function panicked".to_string()),
        }
    }

    fn record_failure(&self, key: &str) {
        *self.failures.entry(key.to_string()).or_insert(0) += 1;
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Run one sweep over a snapshot of the registered keys
    pub fn refresh_all(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        self.sweeps.fetch_add(1, Ordering::Relaxed);

        for key in self.keys() {
            if self.cancelled.load(Ordering::Acquire) {
                report.cancelled = true;
                break;
            }
            // Removed since the snapshot was taken
            let Some(fetch) = self.get(&key) else {
                continue;
            };

            let outcome = Self::fetch_isolated(&key, &fetch);
            // Demoted while fetching: demotion unregisters before it clears storage
            if !self.contains(&key) {
                report.skipped += 1;
                continue;
            }

            match outcome {
                FetchOutcome::Value(value) => match self.storage.put(&key, value) {
                    Ok(()) if !self.contains(&key) => {
                        if let Err(e) = self.storage.remove(&key) {
                            log::warn!("Failed to drop refreshed value for key {}: {}", key, e);
                        }
                        report.skipped += 1;
                    }
                    Ok(()) => {
                        self.failures.remove(&key);
                        self.refreshed.fetch_add(1, Ordering::Relaxed);
                        report.refreshed += 1;
                    }
                    Err(e) => {
                        log::debug!("Refresh write for key {} failed: {}", key, e);
                        self.record_failure(&key);
                        report.failed += 1;
                    }
                },
                FetchOutcome::Absent => {
                    log::debug!("Refresh for key {} returned no value", key);
                    self.record_failure(&key);
                    report.failed += 1;
                }
                FetchOutcome::Failed(reason) => {
                    log::debug!("Refresh for key {} failed: {}", key, reason);
                    self.record_failure(&key);
                    report.failed += 1;
                }
            }
        }

        report.evicted = self.evict_failing();
        report
    }

    fn evict_failing(&self) -> Vec<String> {
        let max = self.config.max_failure_count;
        let failing: Vec<String> = self
            .failures
            .iter()
            .filter(|entry| *entry.value() >= max)
            .map(|entry| entry.key().clone())
            .collect();

        for key in &failing {
            if let Err(e) = self.storage.remove(key) {
                log::warn!("Failed to purge storage entry for key {}: {}", key, e);
            }
            self.registrations.remove(key);
            self.failures.remove(key);
            self.evicted.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "Key {} evicted from refresh after {} consecutive failures",
                key,
                max
            );
        }
        failing
    }

    pub fn snapshot(&self) -> RefreshSnapshot {
        RefreshSnapshot {
            registered: self.registrations.len(),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            refreshed: self.refreshed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        match self.task.lock() {
            Ok(task) => task.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    /// Start the periodic sweep on its own thread
    pub fn start(self: &Arc<Self>) -> Result<(), CacheOperationError> {
        let mut task = self
            .task
            .lock()
            .map_err(|_| CacheOperationError::invalid_state("refresh registry lock poisoned"))?;
        if task.is_some() {
            return Ok(());
        }
        self.cancelled.store(false, Ordering::Release);

        let registry = Arc::downgrade(self);
        *task = Some(ScheduledTask::spawn(
            "hotlox-refresh",
            self.config.interval(),
            move || {
                if let Some(registry) = registry.upgrade() {
                    let report = registry.refresh_all();
                    if report.failed > 0 || !report.evicted.is_empty() {
                        log::debug!(
                            "Refresh sweep: refreshed={} failed={} evicted={}",
                            report.refreshed,
                            report.failed,
                            report.evicted.len()
                        );
                    }
                }
            },
        )?);
        log::info!(
            "Refresh registry started with interval {:?}",
            self.config.interval()
        );
        Ok(())
    }

    /// Stop the sweep, waiting until `deadline` before cancelling it
    pub fn stop_until(&self, deadline: Instant) -> bool {
        let task = match self.task.lock() {
            Ok(mut task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(task) = task else {
            return true;
        };
        task.signal();
        let graceful = task.wait_until(deadline);
        if !graceful {
            // Stops an in-flight sweep before its next key
            self.cancelled.store(true, Ordering::Release);
        }
        log::info!("Refresh registry stopped (graceful: {})", graceful);
        graceful
    }

    pub fn stop(&self, timeout: Duration) -> bool {
        self.stop_until(Instant::now() + timeout)
    }
}

impl<V> std::fmt::Debug for RefreshRegistry<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshRegistry")
            .field("registered", &self.registrations.len())
            .field("failing", &self.failures.len())
            .field("config", &self.config)
            .finish()
    }
}
