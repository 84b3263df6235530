//! Bounded access-recording pool with caller-runs backpressure
//!
//! Accesses are queued on a bounded crossbeam channel and recorded by a fixed
//! set of named worker threads. When the queue is full the submitting thread
//! records the access itself, so the queue never grows past its bound and no
//! access is dropped.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use crossbeam_utils::CachePadded;

use crate::cache::config::WorkerConfig;
use crate::cache::recorder::FrequencyRecorder;
use crate::cache::traits::types_and_enums::CacheOperationError;

const IDLE_POLL: Duration = Duration::from_millis(50);

/// Pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct AccessPoolSnapshot {
    pub queued: u64,
    pub caller_runs: u64,
    pub processed: u64,
    pub failed: u64,
    pub queue_depth: usize,
}

#[derive(Debug, Default)]
struct PoolCounters {
    queued: CachePadded<AtomicU64>,
    caller_runs: CachePadded<AtomicU64>,
    processed: CachePadded<AtomicU64>,
    failed: CachePadded<AtomicU64>,
}

/// Per-instance pool feeding the frequency recorder
#[derive(Debug)]
pub struct AccessWorkerPool {
    recorder: Arc<FrequencyRecorder>,
    sender: Sender<String>,
    receiver: Receiver<String>,
    done_receiver: Receiver<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
    counters: Arc<PoolCounters>,
    shutdown_timeout: Duration,
}

/// Record one access, containing any panic to this single update
fn record_isolated(recorder: &FrequencyRecorder, key: &str, counters: &PoolCounters) {
    match catch_unwind(AssertUnwindSafe(|| recorder.record_access(key))) {
        Ok(()) => {
            counters.processed.fetch_add(1, Ordering::Relaxed);
        }
        Err(_) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            log::error!("Access recording failed for key {}; update skipped", key);
        }
    }
}

impl AccessWorkerPool {
    pub fn new(
        config: &WorkerConfig,
        recorder: Arc<FrequencyRecorder>,
    ) -> Result<Self, CacheOperationError> {
        let (sender, receiver) = bounded::<String>(config.queue_capacity.max(1));
        let (done_sender, done_receiver) = bounded::<()>(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(PoolCounters::default());

        let mut handles = Vec::with_capacity(config.threads);
        for worker_id in 0..config.threads.max(1) {
            let receiver = receiver.clone();
            let done_sender = done_sender.clone();
            let recorder = recorder.clone();
            let worker_shutdown = shutdown.clone();
            let counters = counters.clone();

            let handle = std::thread::Builder::new()
                .name(format!("hotlox-access-{}", worker_id))
                .spawn(move || {
                    let _done = done_sender;
                    Self::worker_loop(&receiver, &recorder, &worker_shutdown, &counters);
                })
                .map_err(|e| {
                    shutdown.store(true, Ordering::Release);
                    CacheOperationError::initialization_failed(format!(
                        "Access worker {} spawn failed: {}",
                        worker_id, e
                    ))
                })?;
            handles.push(handle);
        }
        drop(done_sender);

        Ok(Self {
            recorder,
            sender,
            receiver,
            done_receiver,
            handles: Mutex::new(handles),
            shutdown,
            counters,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    fn worker_loop(
        receiver: &Receiver<String>,
        recorder: &FrequencyRecorder,
        shutdown: &AtomicBool,
        counters: &PoolCounters,
    ) {
        loop {
            match receiver.recv_timeout(IDLE_POLL) {
                Ok(key) => record_isolated(recorder, &key, counters),
                // Queue drained
                Err(RecvTimeoutError::Timeout) => {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// Queue an access, or record it on the calling thread when the queue is full
    pub fn submit(&self, key: &str) {
        if self.shutdown.load(Ordering::Acquire) {
            self.run_on_caller(key);
            self.drain_on_caller();
            return;
        }
        match self.sender.try_send(key.to_string()) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                // Workers may have exited between the check and the send
                if self.shutdown.load(Ordering::Acquire) {
                    self.drain_on_caller();
                }
            }
            Err(TrySendError::Full(key)) | Err(TrySendError::Disconnected(key)) => {
                self.run_on_caller(&key);
            }
        }
    }

    /// Record everything still queued on the calling thread
    fn drain_on_caller(&self) -> usize {
        let mut drained = 0;
        while let Ok(key) = self.receiver.try_recv() {
            record_isolated(&self.recorder, &key, &self.counters);
            drained += 1;
        }
        drained
    }

    #[inline]
    fn run_on_caller(&self, key: &str) {
        self.counters.caller_runs.fetch_add(1, Ordering::Relaxed);
        record_isolated(&self.recorder, key, &self.counters);
    }

    pub fn snapshot(&self) -> AccessPoolSnapshot {
        AccessPoolSnapshot {
            queued: self.counters.queued.load(Ordering::Relaxed),
            caller_runs: self.counters.caller_runs.load(Ordering::Relaxed),
            processed: self.counters.processed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            queue_depth: self.sender.len(),
        }
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Drain the queue and stop the workers, detaching any that overrun the timeout
    pub fn shutdown(&self) -> bool {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return true;
        }
        let handles = match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        match self.done_receiver.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                for handle in handles {
                    if handle.join().is_err() {
                        log::error!("Access worker panicked during shutdown");
                    }
                }
                let leftover = self.drain_on_caller();
                log::debug!(
                    "Access worker pool stopped, {} late accesses recorded inline",
                    leftover
                );
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Access worker pool did not drain within {:?}; detaching {} workers",
                    self.shutdown_timeout,
                    handles.len()
                );
                false
            }
        }
    }
}

impl Drop for AccessWorkerPool {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
