//! Hot-key configuration with production defaults
//!
//! Every component receives the same validated `Arc<HotKeyConfig>`.

pub mod types;

pub use types::{
    AdmissionConfig, ConfigError, DetectionConfig, HotKeyConfig, MonitorConfig, RecorderConfig,
    RefreshConfig, StorageConfig, WorkerConfig,
};
