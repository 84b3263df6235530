//! Error types and collaborator traits for the hot-key core

pub mod storage;
pub mod types_and_enums;

pub use storage::{FetchFn, HotKeyStorage};
pub use types_and_enums::CacheOperationError;
