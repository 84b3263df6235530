//! Read-path hit-rate statistics

pub mod hit_rate;

pub use hit_rate::{HitRateSnapshot, HitRateStatistics};
