//! Scheduled refresh of hot-key values from their sources

pub mod registry;

pub use registry::{RefreshRegistry, RefreshReport, RefreshSnapshot};
