//! Lock-free atomic f64 built on the bit pattern of an `AtomicU64`
//!
//! Used for per-key QPS values that are written by whichever thread recomputes
//! them and read without locks by the selector.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic f64 implementation using bit manipulation
#[derive(Debug)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    #[inline]
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn load(&self, ordering: Ordering) -> f64 {
        f64::from_bits(self.bits.load(ordering))
    }

    #[inline]
    pub fn store(&self, value: f64, ordering: Ordering) {
        self.bits.store(value.to_bits(), ordering);
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}
