//! Hotlox - in-process hot-key detection with local caching
//!
//! Wraps reads against a remote source, measures per-key access rates over a
//! sliding window, and serves the hottest keys from a bounded local cache.
//!
//! # Features
//!
//! - **Two-tier recording**: cheap staging counters ahead of full access windows
//! - **Adaptive admission**: sampling that bounds memory under high key cardinality
//! - **Lock-free reads**: the hot-key set is an atomically swapped snapshot
//! - **Background refresh**: cached hot values are reloaded from their source
//! - **Observability**: hit rate, traffic ratio and recorder memory estimates

pub mod cache;
pub mod hotlox;
pub mod prelude;

pub use hotlox::{Hotlox, HotloxBuilder};
pub use prelude::*;
