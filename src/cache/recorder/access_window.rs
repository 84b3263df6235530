//! Per-key fixed window counter with decaying QPS
//!
//! QPS is `count / window length`, never `count / elapsed`, so a burst at the
//! start of a window cannot spike the estimate. When a window closes, the closed
//! window's rate fades linearly over half a window instead of dropping to zero.
//! Past that decay phase the window is hard-reset.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::types::atomic_float::AtomicF64;

/// Sliding access window for one tracked key
#[derive(Debug)]
pub struct AccessWindow {
    count: AtomicU64,
    window_start: AtomicU64,
    last_access: AtomicU64,
    previous_qps: AtomicF64,
    window_ms: u64,
}

impl AccessWindow {
    /// Window seeded with `initial_count` accesses carried over from staging
    pub fn with_count(initial_count: u64, now_ms: u64, window_ms: u64) -> Self {
        let window_ms = window_ms.max(1);
        Self {
            count: AtomicU64::new(initial_count),
            window_start: AtomicU64::new(now_ms),
            last_access: AtomicU64::new(now_ms),
            previous_qps: AtomicF64::new(0.0),
            window_ms,
        }
    }

    #[inline(always)]
    fn half_window(&self) -> u64 {
        (self.window_ms / 2).max(1)
    }

    #[inline(always)]
    fn rate(&self, count: u64) -> f64 {
        count as f64 * 1_000.0 / self.window_ms as f64
    }

    /// Record one access at `now_ms`
    pub fn record(&self, now_ms: u64) {
        let start = self.window_start.load(Ordering::Acquire);
        if now_ms.saturating_sub(start) >= self.window_ms {
            self.roll(start, now_ms);
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        self.last_access.fetch_max(now_ms, Ordering::Relaxed);
    }

    /// Start a new window; only the thread that wins the start CAS resets
    fn roll(&self, observed_start: u64, now_ms: u64) {
        if self
            .window_start
            .compare_exchange(observed_start, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let closed = self.count.swap(0, Ordering::AcqRel);
        let expired = now_ms.saturating_sub(observed_start + self.window_ms);
        // Windows that ended more than half a window ago have fully decayed
        let carried = if expired >= self.half_window() {
            0.0
        } else {
            self.rate(closed)
        };
        self.previous_qps.store(carried, Ordering::Release);
    }

    /// Current QPS estimate; may hard-reset a fully decayed window
    pub fn qps(&self, now_ms: u64) -> f64 {
        let start = self.window_start.load(Ordering::Acquire);
        let elapsed = now_ms.saturating_sub(start);
        let half = self.half_window() as f64;

        if elapsed < self.window_ms {
            let current = self.rate(self.count.load(Ordering::Relaxed));
            let previous = self.previous_qps.load(Ordering::Acquire);
            if previous > current && (elapsed as f64) < half {
                let fade = 1.0 - elapsed as f64 / half;
                current + (previous - current) * fade
            } else {
                current
            }
        } else {
            let expired = elapsed - self.window_ms;
            if expired as f64 >= half {
                self.hard_reset(start, now_ms);
                0.0
            } else {
                let closing = self.rate(self.count.load(Ordering::Relaxed));
                closing * (1.0 - expired as f64 / half)
            }
        }
    }

    fn hard_reset(&self, observed_start: u64, now_ms: u64) {
        if self
            .window_start
            .compare_exchange(observed_start, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.count.store(0, Ordering::Release);
            self.previous_qps.store(0.0, Ordering::Release);
        }
    }

    #[inline(always)]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }
}
