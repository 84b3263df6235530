//! Named background thread running a closure at a fixed delay
//!
//! The loop parks on a bounded(1) shutdown channel with `recv_timeout`, so a
//! stop signal wakes it immediately. Each tick runs inside `catch_unwind`; a
//! panicking tick is logged and the schedule continues. Exit is acknowledged by
//! dropping a done sender, which lets `wait_until` bound its wait without
//! blocking on `join`.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::cache::traits::types_and_enums::CacheOperationError;

/// Handle to a running fixed-delay background loop
#[derive(Debug)]
pub struct ScheduledTask {
    name: String,
    shutdown_sender: Sender<()>,
    done_receiver: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Spawn `tick` on a thread named `name`, running every `interval`
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> Result<Self, CacheOperationError>
    where
        F: FnMut() + Send + 'static,
    {
        let (shutdown_sender, shutdown_receiver) = bounded::<()>(1);
        let (done_sender, done_receiver) = bounded::<()>(1);
        let thread_name = name.to_string();

        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let _done = done_sender;
                log::debug!("{} started with interval {:?}", thread_name, interval);
                loop {
                    match shutdown_receiver.recv_timeout(interval) {
                        Ok(()) => break,
                        Err(RecvTimeoutError::Timeout) => {
                            if catch_unwind(AssertUnwindSafe(&mut tick)).is_err() {
                                log::error!("{} tick panicked; continuing on next tick", thread_name);
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            log::warn!("{} shutdown channel disconnected", thread_name);
                            break;
                        }
                    }
                }
                log::debug!("{} stopped", thread_name);
            })
            .map_err(|e| {
                log::error!("Failed to spawn {} thread: {}", name, e);
                CacheOperationError::initialization_failed(format!(
                    "{} thread spawn failed: {}",
                    name, e
                ))
            })?;

        Ok(Self {
            name: name.to_string(),
            shutdown_sender,
            done_receiver,
            handle: Some(handle),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the loop to exit after its current tick
    pub fn signal(&self) {
        let _ = self.shutdown_sender.try_send(());
    }

    /// Wait for exit until `deadline`; detach the thread if it is still busy
    ///
    /// Returns `true` when the loop exited in time.
    pub fn wait_until(mut self, deadline: Instant) -> bool {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.done_receiver.recv_timeout(remaining) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take()
                    && handle.join().is_err()
                {
                    log::error!("{} thread panicked during shutdown", self.name);
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "{} did not stop in time; detaching its thread",
                    self.name
                );
                self.handle.take();
                false
            }
        }
    }
}
