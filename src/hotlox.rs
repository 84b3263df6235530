//! Public API for the hotlox hot-key cache
//!
//! `Hotlox<V>` wraps reads against a slow source. Every read is counted; keys
//! that stay above the hot threshold are promoted and their values served from
//! local storage until they cool down again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cache::config::{
    AdmissionConfig, DetectionConfig, HotKeyConfig, MonitorConfig, RecorderConfig, RefreshConfig,
    StorageConfig, WorkerConfig,
};
use crate::cache::manager::{HotKeyManager, HotKeySet};
use crate::cache::monitor::MonitorInfo;
use crate::cache::recorder::{FrequencyRecorder, RecorderStatistics};
use crate::cache::refresh::{RefreshRegistry, RefreshReport};
use crate::cache::statistics::{HitRateSnapshot, HitRateStatistics};
use crate::cache::storage::MokaStorage;
use crate::cache::traits::storage::{FetchFn, HotKeyStorage};
use crate::cache::traits::types_and_enums::CacheOperationError;
use crate::cache::types::clock::{SharedClock, system_clock};
use crate::cache::worker::{AccessWorkerPool, CoordinatorState, TaskCoordinator, TickReport};

/// Components read when building a [`MonitorInfo`]
struct MonitorSources<V>
where
    V: Clone + Send + Sync + 'static,
{
    manager: Arc<HotKeyManager<V>>,
    storage: Arc<dyn HotKeyStorage<V>>,
    recorder: Arc<FrequencyRecorder>,
    registry: Arc<RefreshRegistry<V>>,
    statistics: Arc<HitRateStatistics>,
}

impl<V> Clone for MonitorSources<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            storage: self.storage.clone(),
            recorder: self.recorder.clone(),
            registry: self.registry.clone(),
            statistics: self.statistics.clone(),
        }
    }
}

impl<V> MonitorSources<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn collect(&self) -> MonitorInfo {
        MonitorInfo::new(
            self.manager.hot_keys().iter().cloned().collect(),
            self.storage.size(),
            self.recorder.statistics(),
            self.registry.size(),
            &self.statistics.snapshot(),
        )
    }
}

/// Hot-key detector with local caching for promoted keys
pub struct Hotlox<V>
where
    V: Clone + Send + Sync + 'static,
{
    config: Arc<HotKeyConfig>,
    sources: MonitorSources<V>,
    coordinator: Arc<TaskCoordinator<V>>,
    shut_down: AtomicBool,
}

impl<V> Hotlox<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a builder with default configuration
    pub fn builder() -> HotloxBuilder<V> {
        HotloxBuilder::new()
    }

    /// Build and start with default configuration
    pub fn new() -> Result<Self, CacheOperationError> {
        Self::builder().build()
    }

    /// Read `key`, serving promoted keys from local storage
    ///
    /// `fetch` is called on every read of a key that is not hot and on misses of
    /// hot keys. Its errors are returned unchanged and absent values are never
    /// cached. A value fetched for a hot key is stored and `fetch` is registered
    /// to refresh it in the background.
    pub fn wrap_get<F>(&self, key: &str, fetch: F) -> Result<Option<V>, CacheOperationError>
    where
        F: Fn(&str) -> Result<Option<V>, CacheOperationError> + Send + Sync + 'static,
    {
        if !self.config.enabled {
            return fetch(key);
        }

        let sources = &self.sources;
        sources.statistics.record_wrap_get(key);
        sources.manager.record_access(key);

        if !sources.manager.is_hot_key(key) {
            return fetch(key);
        }

        sources.statistics.record_hot_key_access();
        if let Some(value) = sources.storage.get(key) {
            sources.statistics.record_hit();
            return Ok(Some(value));
        }
        sources.statistics.record_miss();

        let value = fetch(key)?;
        if let Some(value) = &value {
            self.cache_fetched(key, value.clone(), Arc::new(fetch));
        }
        Ok(value)
    }

    fn cache_fetched(&self, key: &str, value: V, fetch: FetchFn<V>) {
        let sources = &self.sources;
        if let Err(e) = sources.storage.put(key, value) {
            log::warn!("Failed to cache hot key {}: {}", key, e);
            return;
        }
        sources.registry.register(key, fetch);

        // A demotion that published before this check has already swept, so
        // undo the write and registration ourselves
        if !sources.manager.is_hot_key(key) {
            sources.registry.remove(key);
            if let Err(e) = sources.storage.remove(key) {
                log::warn!("Failed to drop value of demoted key {}: {}", key, e);
            }
        }
    }

    #[inline]
    pub fn is_hot_key(&self, key: &str) -> bool {
        self.sources.manager.is_hot_key(key)
    }

    /// Current hot-key snapshot
    #[inline]
    pub fn hot_keys(&self) -> Arc<HotKeySet> {
        self.sources.manager.hot_keys()
    }

    pub fn monitor_info(&self) -> MonitorInfo {
        self.sources.collect()
    }

    pub fn recorder_statistics(&self) -> RecorderStatistics {
        self.sources.recorder.statistics()
    }

    pub fn hit_rate(&self) -> HitRateSnapshot {
        self.sources.statistics.snapshot()
    }

    #[inline]
    pub fn config(&self) -> &HotKeyConfig {
        &self.config
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.coordinator.is_running()
    }

    #[inline]
    pub fn state(&self) -> CoordinatorState {
        self.coordinator.state()
    }

    /// Start the background loops of a cache built with `auto_start(false)`
    pub fn start(&self) -> Result<(), CacheOperationError> {
        self.coordinator.start()
    }

    /// Run one promotion tick on the calling thread
    pub fn run_promotion_tick(&self) -> TickReport {
        self.coordinator.run_promotion_tick()
    }

    /// Run one refresh sweep on the calling thread
    pub fn refresh_now(&self) -> RefreshReport {
        self.sources.registry.refresh_all()
    }

    /// Stop background loops and the access pool; safe to call repeatedly
    ///
    /// Returns `false` when some work had to be abandoned after the bounded wait.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return true;
        }
        let coordinator = self.coordinator.stop();
        let pool = self.sources.manager.shutdown();
        log::info!("Hotlox shut down");
        coordinator && pool
    }
}

impl<V> Drop for Hotlox<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<V> std::fmt::Debug for Hotlox<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hotlox")
            .field("enabled", &self.config.enabled)
            .field("manager", &self.sources.manager)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

/// Builder for [`Hotlox`]
pub struct HotloxBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    config: HotKeyConfig,
    storage: Option<Arc<dyn HotKeyStorage<V>>>,
    clock: Option<SharedClock>,
    auto_start: bool,
}

impl<V> Default for HotloxBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> HotloxBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: HotKeyConfig::default(),
            storage: None,
            clock: None,
            auto_start: true,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: HotKeyConfig) -> Self {
        self.config = config;
        self
    }

    /// Parse the configuration from JSON
    pub fn config_json(mut self, json: &str) -> Result<Self, CacheOperationError> {
        self.config = HotKeyConfig::from_json(json)?;
        Ok(self)
    }

    /// Pass reads straight through to the source when false
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn detection(mut self, detection: DetectionConfig) -> Self {
        self.config.detection = detection;
        self
    }

    pub fn admission(mut self, admission: AdmissionConfig) -> Self {
        self.config.admission = admission;
        self
    }

    pub fn recorder(mut self, recorder: RecorderConfig) -> Self {
        self.config.recorder = recorder;
        self
    }

    pub fn storage_config(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    pub fn refresh(mut self, refresh: RefreshConfig) -> Self {
        self.config.refresh = refresh;
        self
    }

    pub fn monitor(mut self, monitor: MonitorConfig) -> Self {
        self.config.monitor = monitor;
        self
    }

    pub fn worker(mut self, worker: WorkerConfig) -> Self {
        self.config.worker = worker;
        self
    }

    /// Set the hot threshold in accesses per second
    pub fn hot_qps_threshold(mut self, qps: f64) -> Self {
        self.config.detection.hot_qps_threshold = qps;
        self
    }

    /// Set how many keys one promotion tick may consider
    pub fn top_n(mut self, top_n: usize) -> Self {
        self.config.detection.top_n = top_n;
        self
    }

    /// Use custom local storage instead of the bounded moka cache
    pub fn with_storage(mut self, storage: Arc<dyn HotKeyStorage<V>>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use a custom time source
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Start background loops during `build` (default true)
    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Validate the configuration and assemble the cache
    pub fn build(self) -> Result<Hotlox<V>, CacheOperationError> {
        self.config.validate()?;
        let config = Arc::new(self.config);
        let clock = self.clock.unwrap_or_else(system_clock);
        let storage = match self.storage {
            Some(storage) => storage,
            None => Arc::new(MokaStorage::from_config(&config.storage)),
        };

        let recorder = Arc::new(FrequencyRecorder::new(config.clone(), clock.clone()));
        let statistics = Arc::new(HitRateStatistics::new(&config.monitor, clock));
        let registry = Arc::new(RefreshRegistry::new(config.refresh.clone(), storage.clone()));
        let pool = AccessWorkerPool::new(&config.worker, recorder.clone())?;
        let manager = Arc::new(HotKeyManager::new(pool, storage.clone(), registry.clone()));

        let sources = MonitorSources {
            manager: manager.clone(),
            storage,
            recorder: recorder.clone(),
            registry: registry.clone(),
            statistics,
        };
        let monitor_sources = sources.clone();
        let coordinator = Arc::new(TaskCoordinator::new(
            config.clone(),
            recorder,
            manager,
            registry,
            Some(Arc::new(move || monitor_sources.collect())),
        ));

        let cache = Hotlox {
            config,
            sources,
            coordinator,
            shut_down: AtomicBool::new(false),
        };
        if self.auto_start && cache.config.enabled {
            cache.start()?;
        }
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use std::panic::panic_any;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{OnceLock, Weak};
    use std::time::{Duration, Instant};

    use super::*;
    use crate::cache::types::clock::ManualClock;

    fn manual_cache(tweak: impl FnOnce(&mut HotKeyConfig)) -> (Hotlox<String>, Arc<ManualClock>) {
        let mut config = HotKeyConfig::default();
        config.monitor.enabled = false;
        tweak(&mut config);
        let clock = Arc::new(ManualClock::new(0));
        let cache = Hotlox::builder()
            .config(config)
            .with_clock(clock.clone())
            .auto_start(false)
            .build()
            .unwrap();
        (cache, clock)
    }

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
    ) -> impl Fn(&str) -> Result<Option<String>, CacheOperationError> + Send + Sync + 'static {
        let calls = calls.clone();
        move |key: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("value-{}", key)))
        }
    }

    /// Push `per_second` accesses per second for `seconds` straight into the recorder
    fn sustain(
        cache: &Hotlox<String>,
        clock: &ManualClock,
        key: &str,
        per_second: usize,
        seconds: u64,
    ) {
        for _ in 0..seconds {
            for _ in 0..per_second {
                cache.sources.recorder.record_access(key);
            }
            clock.advance_millis(1_000);
        }
    }

    fn scenario_config(config: &mut HotKeyConfig) {
        config.admission.enabled = false;
        config.detection.hot_qps_threshold = 3_000.0;
        config.detection.top_n = 10;
        config.detection.demotion_multiplier = 2;
    }

    #[test]
    fn test_sustained_key_promoted_within_one_tick() {
        let (cache, clock) = manual_cache(scenario_config);
        sustain(&cache, &clock, "k1", 5_000, 6);
        sustain(&cache, &clock, "background", 100, 1);

        let report = cache.run_promotion_tick();
        assert_eq!(report.promoted, 1);
        assert!(cache.is_hot_key("k1"));
        assert!(!cache.is_hot_key("background"));
    }

    #[test]
    fn test_idle_hot_key_demoted_and_purged() {
        let (cache, clock) = manual_cache(scenario_config);
        sustain(&cache, &clock, "k1", 5_000, 6);
        cache.run_promotion_tick();
        assert!(cache.is_hot_key("k1"));

        let calls = Arc::new(AtomicUsize::new(0));
        cache.wrap_get("k1", counting_fetch(&calls)).unwrap();
        assert!(cache.sources.storage.get("k1").is_some());
        assert!(cache.sources.registry.contains("k1"));

        // Window closes and fully decays with no accesses
        clock.advance_millis(20_000);
        let report = cache.run_promotion_tick();
        assert_eq!(report.demoted, Some(1));
        assert!(!cache.is_hot_key("k1"));
        assert_eq!(cache.sources.storage.get("k1"), None);
        assert!(!cache.sources.registry.contains("k1"));
    }

    #[test]
    fn test_failing_refresh_evicts_after_max_failures() {
        let (cache, clock) = manual_cache(|c| {
            scenario_config(c);
            c.refresh.max_failure_count = 3;
        });
        sustain(&cache, &clock, "k2", 5_000, 6);
        cache.run_promotion_tick();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let value = cache
            .wrap_get("k2", move |_key: &str| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(Some("v2".to_string()))
                } else {
                    panic_any("source down")
                }
            })
            .unwrap();
        assert_eq!(value, Some("v2".to_string()));
        assert!(cache.sources.registry.contains("k2"));

        for sweep in 1..=3 {
            let report = cache.refresh_now();
            assert_eq!(report.failed, 1);
            if sweep < 3 {
                assert_eq!(cache.sources.registry.failure_count("k2"), sweep);
            }
        }
        assert!(!cache.sources.registry.contains("k2"));
        assert_eq!(cache.sources.storage.get("k2"), None);
        assert_eq!(cache.sources.registry.failure_count("k2"), 0);
    }

    #[test]
    fn test_demotion_during_refresh_leaves_no_stale_value() {
        let (cache, clock) = manual_cache(scenario_config);
        sustain(&cache, &clock, "k1", 5_000, 6);
        cache.run_promotion_tick();

        let manager = Arc::downgrade(&cache.sources.manager);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        cache
            .wrap_get("k1", move |key: &str| {
                // Second call is the background refresh; demote underneath it
                if counter.fetch_add(1, Ordering::SeqCst) == 1
                    && let Some(manager) = manager.upgrade()
                {
                    manager.demote(&[key.to_string()]);
                }
                Ok(Some("stale".to_string()))
            })
            .unwrap();
        assert!(cache.sources.registry.contains("k1"));

        let report = cache.refresh_now();
        assert_eq!(report.skipped, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.is_hot_key("k1"));
        assert_eq!(cache.sources.storage.get("k1"), None);
        assert!(!cache.sources.registry.contains("k1"));

        // Still above the threshold, so the next tick promotes it again
        assert_eq!(cache.run_promotion_tick().promoted, 1);
        let fresh = Arc::new(AtomicUsize::new(0));
        let value = cache.wrap_get("k1", counting_fetch(&fresh)).unwrap();
        assert_eq!(value, Some("value-k1".to_string()));
        assert_eq!(fresh.load(Ordering::SeqCst), 1);
    }

    /// Moka storage that can demote a key as soon as its value is written
    struct DemotingStorage {
        inner: MokaStorage<String>,
        manager: OnceLock<Weak<HotKeyManager<String>>>,
        reject_writes: bool,
    }

    impl DemotingStorage {
        fn new(reject_writes: bool) -> Arc<Self> {
            Arc::new(Self {
                inner: MokaStorage::new(100, Duration::from_secs(60)),
                manager: OnceLock::new(),
                reject_writes,
            })
        }
    }

    impl HotKeyStorage<String> for DemotingStorage {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn put(&self, key: &str, value: String) -> Result<(), CacheOperationError> {
            if self.reject_writes {
                return Err(CacheOperationError::storage_error("storage is read-only"));
            }
            self.inner.put(key, value)?;
            if let Some(manager) = self.manager.get().and_then(Weak::upgrade) {
                manager.demote(&[key.to_string()]);
            }
            Ok(())
        }

        fn remove(&self, key: &str) -> Result<(), CacheOperationError> {
            self.inner.remove(key)
        }

        fn size(&self) -> u64 {
            self.inner.size()
        }
    }

    fn cache_over(storage: Arc<DemotingStorage>) -> (Hotlox<String>, Arc<ManualClock>) {
        let mut config = HotKeyConfig::default();
        config.monitor.enabled = false;
        scenario_config(&mut config);
        let clock = Arc::new(ManualClock::new(0));
        let cache = Hotlox::builder()
            .config(config)
            .with_storage(storage as Arc<dyn HotKeyStorage<String>>)
            .with_clock(clock.clone())
            .auto_start(false)
            .build()
            .unwrap();
        (cache, clock)
    }

    #[test]
    fn test_demotion_during_cache_fill_leaves_nothing_behind() {
        let storage = DemotingStorage::new(false);
        let (cache, clock) = cache_over(storage.clone());
        sustain(&cache, &clock, "k1", 5_000, 6);
        cache.run_promotion_tick();
        assert!(cache.is_hot_key("k1"));
        let _ = storage.manager.set(Arc::downgrade(&cache.sources.manager));

        let calls = Arc::new(AtomicUsize::new(0));
        let value = cache.wrap_get("k1", counting_fetch(&calls)).unwrap();
        assert_eq!(value, Some("value-k1".to_string()));
        assert!(!cache.is_hot_key("k1"));
        assert!(!cache.sources.registry.contains("k1"));
        assert_eq!(storage.get("k1"), None);
    }

    #[test]
    fn test_storage_write_failure_still_returns_value() {
        let storage = DemotingStorage::new(true);
        let (cache, clock) = cache_over(storage.clone());
        sustain(&cache, &clock, "k1", 5_000, 6);
        cache.run_promotion_tick();

        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let value = cache.wrap_get("k1", counting_fetch(&calls)).unwrap();
            assert_eq!(value, Some("value-k1".to_string()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_hot_key("k1"));
        assert!(!cache.sources.registry.contains("k1"));
        assert_eq!(cache.hit_rate().hot_key_miss_count, 2);
    }

    /// Wait until every submitted access has been recorded
    fn settle(cache: &Hotlox<String>) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let pool = cache.sources.manager.pool().snapshot();
            let recorded = pool.processed + pool.failed;
            if pool.queue_depth == 0 && recorded >= pool.queued + pool.caller_runs {
                return;
            }
            assert!(Instant::now() < deadline, "access pool never drained: {:?}", pool);
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_wrap_get_traffic_promotes_through_admission() {
        let (cache, clock) = manual_cache(|c| {
            scenario_config(c);
            c.admission.enabled = true;
            // The first accesses before fast admission may be sampled out
            c.detection.hot_qps_threshold = 2_900.0;
        });
        let calls = Arc::new(AtomicUsize::new(0));
        for second in 0..6 {
            for _ in 0..5_000 {
                cache.wrap_get("k1", counting_fetch(&calls)).unwrap();
            }
            for i in 0..100 {
                let key = format!("one-shot-{}-{}", second, i);
                cache.wrap_get(&key, counting_fetch(&calls)).unwrap();
            }
            clock.advance_millis(1_000);
        }
        settle(&cache);
        assert_eq!(calls.load(Ordering::SeqCst), 30_600);

        let report = cache.run_promotion_tick();
        assert_eq!(report.promoted, 1);
        assert!(cache.is_hot_key("k1"));
        assert!(!cache.is_hot_key("one-shot-0-0"));

        for _ in 0..3 {
            cache.wrap_get("k1", counting_fetch(&calls)).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 30_601);
    }

    #[test]
    fn test_distinct_key_gauge_saturates_at_cap() {
        let (cache, _clock) = manual_cache(|c| c.monitor.max_window_keys = 100_000);
        for i in 0..200_000 {
            cache.sources.statistics.record_wrap_get(&format!("key-{}", i));
        }
        let snapshot = cache.hit_rate();
        assert_eq!(snapshot.distinct_key_count, 100_000);
        assert_eq!(snapshot.total_wrap_get_count, 200_000);
    }

    #[test]
    fn test_hot_key_served_from_storage() {
        let (cache, clock) = manual_cache(scenario_config);
        sustain(&cache, &clock, "k1", 5_000, 6);
        cache.run_promotion_tick();

        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let value = cache.wrap_get("k1", counting_fetch(&calls)).unwrap();
            assert_eq!(value, Some("value-k1".to_string()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.hit_rate();
        assert_eq!(stats.hot_key_access_count, 5);
        assert_eq!(stats.hot_key_hit_count, 4);
        assert_eq!(stats.hot_key_miss_count, 1);
    }

    #[test]
    fn test_cold_key_always_fetches() {
        let (cache, _clock) = manual_cache(scenario_config);
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            cache.wrap_get("cold", counting_fetch(&calls)).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.sources.storage.get("cold"), None);
        assert_eq!(cache.hit_rate().total_wrap_get_count, 3);
    }

    #[test]
    fn test_absent_and_errors_are_not_cached() {
        let (cache, clock) = manual_cache(scenario_config);
        sustain(&cache, &clock, "k1", 5_000, 6);
        cache.run_promotion_tick();

        let absent = cache.wrap_get("k1", |_key: &str| Ok(None)).unwrap();
        assert_eq!(absent, None);
        assert_eq!(cache.sources.storage.get("k1"), None);

        let err = cache
            .wrap_get("k1", |_key: &str| {
                Err(CacheOperationError::fetch_failed("backend unavailable"))
            })
            .unwrap_err();
        assert!(matches!(err, CacheOperationError::FetchFailed(_)));
        assert!(!cache.sources.registry.contains("k1"));
    }

    #[test]
    fn test_disabled_passes_through() {
        let (cache, _clock) = manual_cache(|c| c.enabled = false);
        let calls = Arc::new(AtomicUsize::new(0));
        let value = cache.wrap_get("k", counting_fetch(&calls)).unwrap();
        assert_eq!(value, Some("value-k".to_string()));
        assert_eq!(cache.hit_rate().total_wrap_get_count, 0);
    }

    #[test]
    fn test_invalid_config_rejected_before_start() {
        let result = Hotlox::<String>::builder().top_n(0).build();
        assert!(matches!(
            result,
            Err(CacheOperationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_config_from_json() {
        let cache = Hotlox::<String>::builder()
            .config_json(r#"{"detection": {"top_n": 5}, "monitor": {"enabled": false}}"#)
            .unwrap()
            .auto_start(false)
            .build()
            .unwrap();
        assert_eq!(cache.config().detection.top_n, 5);
        assert_eq!(cache.config().detection.hot_qps_threshold, 500.0);
    }

    #[test]
    fn test_monitor_info_reflects_state() {
        let (cache, clock) = manual_cache(scenario_config);
        sustain(&cache, &clock, "k1", 5_000, 6);
        cache.run_promotion_tick();
        cache
            .wrap_get("k1", |_key: &str| Ok(Some("v".to_string())))
            .unwrap();

        let info = cache.monitor_info();
        assert_eq!(info.hot_keys, vec!["k1".to_string()]);
        assert_eq!(info.storage_size, 1);
        assert_eq!(info.registry_size, 1);
        assert!(info.recorder_size >= 1);
        assert!(info.to_json().unwrap().contains("\"hot_key_count\":1"));
    }

    #[test]
    fn test_lifecycle_and_idempotent_shutdown() {
        let cache = Hotlox::<String>::builder()
            .monitor(MonitorConfig {
                enabled: false,
                ..MonitorConfig::default()
            })
            .build()
            .unwrap();
        assert!(cache.is_running());
        assert!(cache.start().is_err());

        assert!(cache.shutdown());
        assert_eq!(cache.state(), CoordinatorState::Stopped);
        assert!(cache.shutdown());

        // Reads keep working after shutdown, recording on the caller
        let value = cache
            .wrap_get("k", |_key: &str| Ok(Some("v".to_string())))
            .unwrap();
        assert_eq!(value, Some("v".to_string()));
    }
}
