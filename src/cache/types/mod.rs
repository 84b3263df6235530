//! Shared primitive types: time source and atomic floats

pub mod atomic_float;
pub mod clock;

pub use atomic_float::AtomicF64;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
