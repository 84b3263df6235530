//! Adaptive admission sampling for keys without a full access window
//!
//! Low-frequency keys are recorded only with probability equal to the sampling
//! rate. Two fixed-size sketches keep the sampler's own memory constant no matter
//! how many distinct keys pass through it:
//!
//! - a count-min attempt sketch, reset every sampling window, estimates each
//!   key's attempt rate for fast admission
//! - a rejection sketch counts sampling rejections for forced admission
//!
//! Both counts are upper bounds. The attempt sketch takes the minimum over
//! several rows and only raises the rows holding that minimum, so unrelated
//! one-shot keys do not push each other over the fast-admission rate.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use ahash::RandomState;
use crossbeam_utils::CachePadded;

use crate::cache::config::AdmissionConfig;

const REJECTION_SLOTS: usize = 4096;

/// Attempt sketch rows; each row takes 14 bits of the key hash
const SKETCH_DEPTH: usize = 4;
const SKETCH_WIDTH: usize = 1 << 14;

/// Outcome of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Staged count already above the minimum frequency
    Established,
    /// Attempt rate above the fast-admission threshold
    FastTrack,
    /// Passed the sampling draw
    Sampled,
    /// Rejected too often, admitted unconditionally
    Forced,
    Rejected,
}

impl AdmissionDecision {
    #[inline(always)]
    pub fn is_admitted(self) -> bool {
        !matches!(self, AdmissionDecision::Rejected)
    }
}

/// Point-in-time sampler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SamplerSnapshot {
    pub established: u64,
    pub fast_tracked: u64,
    pub sampled: u64,
    pub forced: u64,
    pub rejected: u64,
}

/// Count-min sketch with conservative update
#[derive(Debug)]
struct AttemptSketch {
    counters: Box<[AtomicU32]>,
}

impl AttemptSketch {
    fn new() -> Self {
        Self {
            counters: (0..SKETCH_DEPTH * SKETCH_WIDTH)
                .map(|_| AtomicU32::new(0))
                .collect(),
        }
    }

    #[inline(always)]
    fn cells(hash: u64) -> [usize; SKETCH_DEPTH] {
        let mut cells = [0; SKETCH_DEPTH];
        for (row, cell) in cells.iter_mut().enumerate() {
            let column = (hash >> (row * 14)) as usize & (SKETCH_WIDTH - 1);
            *cell = row * SKETCH_WIDTH + column;
        }
        cells
    }

    /// Count one attempt and return the new estimate
    fn increment(&self, hash: u64) -> u32 {
        let cells = Self::cells(hash);
        let estimate = cells
            .iter()
            .map(|&cell| self.counters[cell].load(Ordering::Relaxed))
            .min()
            .unwrap_or(0)
            .saturating_add(1);
        for &cell in &cells {
            self.counters[cell].fetch_max(estimate, Ordering::Relaxed);
        }
        estimate
    }

    fn clear(&self) {
        for counter in self.counters.iter() {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Hash-sketch based admission sampler
#[derive(Debug)]
pub struct AdmissionSampler {
    config: AdmissionConfig,
    window_ms: u64,
    hasher: RandomState,
    attempts: AttemptSketch,
    rejections: Box<[AtomicU32]>,
    window_start: AtomicU64,
    resetting: AtomicBool,
    established: CachePadded<AtomicU64>,
    fast_tracked: CachePadded<AtomicU64>,
    sampled: CachePadded<AtomicU64>,
    forced: CachePadded<AtomicU64>,
    rejected: CachePadded<AtomicU64>,
}

impl AdmissionSampler {
    pub fn new(config: AdmissionConfig, window_ms: u64, now_ms: u64) -> Self {
        Self {
            config,
            window_ms: window_ms.max(1),
            // Fixed seeds keep decisions stable across instances and restarts
            hasher: RandomState::with_seeds(
                0x243f_6a88_85a3_08d3,
                0x1319_8a2e_0370_7344,
                0xa409_3822_299f_31d0,
                0x082e_fa98_ec4e_6c89,
            ),
            attempts: AttemptSketch::new(),
            rejections: (0..REJECTION_SLOTS).map(|_| AtomicU32::new(0)).collect(),
            window_start: AtomicU64::new(now_ms),
            resetting: AtomicBool::new(false),
            established: CachePadded::new(AtomicU64::new(0)),
            fast_tracked: CachePadded::new(AtomicU64::new(0)),
            sampled: CachePadded::new(AtomicU64::new(0)),
            forced: CachePadded::new(AtomicU64::new(0)),
            rejected: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Top 12 bits after a Fibonacci remix, independent of the attempt rows
    #[inline(always)]
    fn rejection_slot(hash: u64) -> usize {
        (hash.wrapping_mul(0x9e37_79b9_7f4a_7c15) >> 52) as usize & (REJECTION_SLOTS - 1)
    }

    /// Deterministic value in [0, 1) for `key` within the window `epoch`
    #[inline]
    fn unit_hash(&self, key: &str, epoch: u64) -> f64 {
        let hash = self.hasher.hash_one((key, epoch));
        (hash >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Sampling rate after the low-utilization boost
    pub fn effective_rate(&self, staging_utilization: f64) -> f64 {
        if staging_utilization < self.config.capacity_usage_threshold {
            (self.config.sampling_rate * 2.0).min(1.0)
        } else {
            self.config.sampling_rate
        }
    }

    fn maybe_roll(&self, now_ms: u64) {
        let start = self.window_start.load(Ordering::Acquire);
        if now_ms.saturating_sub(start) < self.window_ms {
            return;
        }
        if self
            .resetting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            // Re-check under the flag; another thread may have just rolled
            let start = self.window_start.load(Ordering::Acquire);
            if now_ms.saturating_sub(start) >= self.window_ms {
                self.attempts.clear();
                self.window_start.store(now_ms, Ordering::Release);
            }
            self.resetting.store(false, Ordering::Release);
        }
    }

    /// Decide whether an access to an unwindowed key is recorded
    pub fn admit(
        &self,
        key: &str,
        staged_count: u64,
        staging_utilization: f64,
        now_ms: u64,
    ) -> AdmissionDecision {
        self.maybe_roll(now_ms);
        let hash = self.hasher.hash_one(key);
        let attempts = self.attempts.increment(hash);

        let start = self.window_start.load(Ordering::Acquire);
        let elapsed_secs = (now_ms.saturating_sub(start) as f64 / 1_000.0).max(1.0);
        if attempts as f64 / elapsed_secs >= self.config.fast_admission_qps {
            self.fast_tracked.fetch_add(1, Ordering::Relaxed);
            return AdmissionDecision::FastTrack;
        }

        if staged_count >= self.config.min_frequency {
            self.established.fetch_add(1, Ordering::Relaxed);
            return AdmissionDecision::Established;
        }

        let rate = self.effective_rate(staging_utilization);
        let draw = if self.config.consistent_sampling {
            self.unit_hash(key, now_ms / self.window_ms)
        } else {
            rand::random::<f64>()
        };
        if draw < rate {
            self.sampled.fetch_add(1, Ordering::Relaxed);
            return AdmissionDecision::Sampled;
        }

        let slot = Self::rejection_slot(hash);
        let rejections = self.rejections[slot].fetch_add(1, Ordering::Relaxed) + 1;
        if rejections >= self.config.rejected_access_threshold {
            self.rejections[slot].store(0, Ordering::Relaxed);
            self.forced.fetch_add(1, Ordering::Relaxed);
            return AdmissionDecision::Forced;
        }

        self.rejected.fetch_add(1, Ordering::Relaxed);
        AdmissionDecision::Rejected
    }

    pub fn snapshot(&self) -> SamplerSnapshot {
        SamplerSnapshot {
            established: self.established.load(Ordering::Relaxed),
            fast_tracked: self.fast_tracked.load(Ordering::Relaxed),
            sampled: self.sampled.load(Ordering::Relaxed),
            forced: self.forced.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
