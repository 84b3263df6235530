//! Hot-key set management

pub mod hot_key_manager;

pub use hot_key_manager::{HotKeyManager, HotKeySet};
