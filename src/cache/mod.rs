//! Hot-key detection and local caching internals

pub mod config;
pub mod manager;
pub mod monitor;
pub mod recorder;
pub mod refresh;
pub mod selector;
pub mod statistics;
pub mod storage;
pub mod traits;
pub mod types;
pub mod worker;
