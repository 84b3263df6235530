//! Hotlox prelude - convenient imports for users

pub use crate::hotlox::{Hotlox, HotloxBuilder};

pub use crate::cache::config::{
    AdmissionConfig, ConfigError, DetectionConfig, HotKeyConfig, MonitorConfig, RecorderConfig,
    RefreshConfig, StorageConfig, WorkerConfig,
};
pub use crate::cache::monitor::MonitorInfo;
pub use crate::cache::recorder::RecorderStatistics;
pub use crate::cache::statistics::HitRateSnapshot;
pub use crate::cache::storage::MokaStorage;
pub use crate::cache::traits::{CacheOperationError, FetchFn, HotKeyStorage};
pub use crate::cache::types::clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use crate::cache::worker::CoordinatorState;
