//! Background task coordinator
//!
//! Runs the promotion loop at a fixed delay and, every `demotion_multiplier`th
//! tick, the demotion and recorder cleanup pass as part of the same tick. The
//! refresh registry sweeps on its own timer; the coordinator only starts and
//! stops it. An optional monitor loop logs a summary at its own interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crossbeam_utils::atomic::AtomicCell;

use super::scheduled_task::ScheduledTask;
use super::types::{CoordinatorState, TickReport};
use crate::cache::config::HotKeyConfig;
use crate::cache::manager::HotKeyManager;
use crate::cache::monitor::MonitorInfo;
use crate::cache::recorder::FrequencyRecorder;
use crate::cache::refresh::RefreshRegistry;
use crate::cache::selector::HotKeySelector;
use crate::cache::traits::types_and_enums::CacheOperationError;

/// Produces the current monitoring snapshot
pub type MonitorFn = Arc<dyn Fn() -> MonitorInfo + Send + Sync>;

/// Owns every scheduled background loop
pub struct TaskCoordinator<V>
where
    V: Clone + Send + Sync + 'static,
{
    config: Arc<HotKeyConfig>,
    selector: HotKeySelector,
    recorder: Arc<FrequencyRecorder>,
    manager: Arc<HotKeyManager<V>>,
    registry: Arc<RefreshRegistry<V>>,
    monitor: Option<MonitorFn>,
    state: AtomicCell<CoordinatorState>,
    ticks: AtomicU64,
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl<V> TaskCoordinator<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        config: Arc<HotKeyConfig>,
        recorder: Arc<FrequencyRecorder>,
        manager: Arc<HotKeyManager<V>>,
        registry: Arc<RefreshRegistry<V>>,
        monitor: Option<MonitorFn>,
    ) -> Self {
        Self {
            selector: HotKeySelector::new(config.clone(), recorder.clone()),
            config,
            recorder,
            manager,
            registry,
            monitor,
            state: AtomicCell::new(CoordinatorState::Idle),
            ticks: AtomicU64::new(0),
            tasks: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn state(&self) -> CoordinatorState {
        self.state.load()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state.load() == CoordinatorState::Running
    }

    #[inline]
    pub fn promotion_ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// One promotion tick, with the demotion pass on every Kth tick
    pub fn run_promotion_tick(&self) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;

        let candidates = self.selector.promote(&self.manager.hot_keys());
        let promoted = self.manager.promote(&candidates);

        let mut report = TickReport {
            tick,
            promoted,
            ..TickReport::default()
        };

        let multiplier = u64::from(self.config.detection.demotion_multiplier.max(1));
        if tick % multiplier == 0 {
            let removed = self.selector.demote(&self.manager.hot_keys());
            report.demoted = Some(self.manager.demote(&removed));
            report.cleanup = Some(self.recorder.cleanup());
        }

        if report.promoted > 0 || report.demoted.unwrap_or(0) > 0 {
            log::debug!(
                "Tick {}: promoted={} demoted={:?} hot={}",
                tick,
                report.promoted,
                report.demoted,
                self.manager.hot_key_count()
            );
        }
        report
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<ScheduledTask>> {
        match self.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Idle to running: start the promotion, refresh and monitor loops
    pub fn start(self: &Arc<Self>) -> Result<(), CacheOperationError> {
        if let Err(actual) = self
            .state
            .compare_exchange(CoordinatorState::Idle, CoordinatorState::Running)
        {
            return Err(CacheOperationError::invalid_state(format!(
                "coordinator cannot start from {:?}",
                actual
            )));
        }

        if let Err(e) = self.spawn_loops() {
            log::error!("Coordinator start failed: {}", e);
            self.stop();
            return Err(e);
        }

        log::info!(
            "Task coordinator started: promotion every {:?}, demotion every {} ticks",
            self.config.detection.promotion_interval(),
            self.config.detection.demotion_multiplier
        );
        Ok(())
    }

    fn spawn_loops(self: &Arc<Self>) -> Result<(), CacheOperationError> {
        let coordinator = Arc::downgrade(self);
        let promotion = ScheduledTask::spawn(
            "hotlox-promotion",
            self.config.detection.promotion_interval(),
            move || {
                if let Some(coordinator) = coordinator.upgrade() {
                    coordinator.run_promotion_tick();
                }
            },
        )?;
        self.lock_tasks().push(promotion);

        if self.config.refresh.enabled {
            self.registry.start()?;
        }

        if self.config.monitor.enabled
            && let Some(monitor) = self.monitor.clone()
        {
            let task = ScheduledTask::spawn(
                "hotlox-monitor",
                self.config.monitor.interval(),
                move || monitor().log_summary(),
            )?;
            self.lock_tasks().push(task);
        }
        Ok(())
    }

    /// Stop every loop, waiting at most the shutdown timeout in total
    ///
    /// Loops still busy at the deadline are detached and the in-flight refresh
    /// sweep is cancelled before its next key. Returns `true` when everything
    /// stopped within the wait.
    pub fn stop(&self) -> bool {
        let previous = self.state.swap(CoordinatorState::Stopped);
        if previous == CoordinatorState::Stopped {
            return true;
        }

        let deadline = Instant::now() + self.config.worker.shutdown_timeout();
        let tasks = std::mem::take(&mut *self.lock_tasks());
        for task in &tasks {
            task.signal();
        }

        let mut graceful = self.registry.stop_until(deadline);
        for task in tasks {
            graceful &= task.wait_until(deadline);
        }

        if graceful {
            log::info!("Task coordinator stopped");
        } else {
            log::warn!(
                "Task coordinator forced shutdown after {:?}",
                self.config.worker.shutdown_timeout()
            );
        }
        graceful
    }
}

impl<V> std::fmt::Debug for TaskCoordinator<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCoordinator")
            .field("state", &self.state())
            .field("ticks", &self.promotion_ticks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::config::WorkerConfig;
    use crate::cache::storage::MokaStorage;
    use crate::cache::types::clock::ManualClock;
    use crate::cache::worker::access_pool::AccessWorkerPool;

    struct Fixture {
        coordinator: Arc<TaskCoordinator<String>>,
        recorder: Arc<FrequencyRecorder>,
        manager: Arc<HotKeyManager<String>>,
        clock: Arc<ManualClock>,
    }

    fn fixture(tweak: impl FnOnce(&mut HotKeyConfig)) -> Fixture {
        let mut config = HotKeyConfig::default();
        config.admission.enabled = false;
        config.recorder.min_staging_promotion_count = 1;
        config.detection.warm_qps_threshold = 0.0;
        config.detection.hot_qps_threshold = 5.0;
        config.detection.demotion_multiplier = 3;
        config.monitor.enabled = false;
        tweak(&mut config);
        let config = Arc::new(config);

        let clock = Arc::new(ManualClock::new(0));
        let recorder = Arc::new(FrequencyRecorder::new(config.clone(), clock.clone()));
        let storage = Arc::new(MokaStorage::<String>::new(100, Duration::from_secs(60)));
        let registry = Arc::new(RefreshRegistry::new(config.refresh.clone(), storage.clone()));
        let pool = AccessWorkerPool::new(&WorkerConfig::default(), recorder.clone()).unwrap();
        let manager = Arc::new(HotKeyManager::new(pool, storage, registry.clone()));
        let coordinator = Arc::new(TaskCoordinator::new(
            config,
            recorder.clone(),
            manager.clone(),
            registry,
            None,
        ));
        Fixture {
            coordinator,
            recorder,
            manager,
            clock,
        }
    }

    #[test]
    fn test_demotion_runs_every_kth_tick() {
        let f = fixture(|_| {});
        let reports: Vec<_> = (0..6).map(|_| f.coordinator.run_promotion_tick()).collect();
        let demotion_ticks: Vec<u64> = reports
            .iter()
            .filter(|r| r.ran_demotion())
            .map(|r| r.tick)
            .collect();
        assert_eq!(demotion_ticks, vec![3, 6]);
        assert!(reports[2].cleanup.is_some());
        assert!(reports[0].cleanup.is_none());
    }

    #[test]
    fn test_tick_promotes_then_demotes_cold_key() {
        let f = fixture(|_| {});
        for _ in 0..100 {
            f.recorder.record_access("k1");
        }
        let report = f.coordinator.run_promotion_tick();
        assert_eq!(report.promoted, 1);
        assert!(f.manager.is_hot_key("k1"));

        // Window plus the full decay phase without accesses
        f.clock.advance_millis(15_000);
        f.coordinator.run_promotion_tick();
        assert!(f.manager.is_hot_key("k1"));
        let report = f.coordinator.run_promotion_tick();
        assert_eq!(report.demoted, Some(1));
        assert!(!f.manager.is_hot_key("k1"));
    }

    #[test]
    fn test_lifecycle_transitions() {
        let f = fixture(|c| {
            c.detection.promotion_interval_ms = 10;
            c.refresh.interval_ms = 10;
        });
        assert_eq!(f.coordinator.state(), CoordinatorState::Idle);

        f.coordinator.start().unwrap();
        assert!(f.coordinator.is_running());
        assert!(matches!(
            f.coordinator.start(),
            Err(CacheOperationError::InvalidState(_))
        ));

        std::thread::sleep(Duration::from_millis(100));
        assert!(f.coordinator.promotion_ticks() > 0);

        assert!(f.coordinator.stop());
        assert_eq!(f.coordinator.state(), CoordinatorState::Stopped);
        assert!(f.coordinator.stop());
        assert!(f.coordinator.start().is_err());

        let ticks = f.coordinator.promotion_ticks();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(f.coordinator.promotion_ticks(), ticks);
    }

    #[test]
    fn test_stop_from_idle() {
        let f = fixture(|_| {});
        assert!(f.coordinator.stop());
        assert_eq!(f.coordinator.state(), CoordinatorState::Stopped);
    }

    #[test]
    fn test_monitor_loop_runs() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let mut f = fixture(|c| {
            c.monitor.enabled = true;
            c.monitor.interval_ms = 10;
        });
        let coordinator = Arc::new(TaskCoordinator::new(
            f.coordinator.config.clone(),
            f.recorder.clone(),
            f.manager.clone(),
            f.coordinator.registry.clone(),
            Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                MonitorInfo::default()
            })),
        ));
        f.coordinator = coordinator;

        f.coordinator.start().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(f.coordinator.stop());
        assert!(calls.load(Ordering::SeqCst) > 0);
    }
}
