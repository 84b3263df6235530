//! Core configuration types
//!
//! One immutable [`HotKeyConfig`] value is validated once at construction and then
//! shared by reference with every component. Durations are stored as plain
//! integers so the config round-trips through serde unchanged.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::traits::types_and_enums::CacheOperationError;

/// Hot-key detection thresholds and scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Sliding window length in seconds
    pub window_size_secs: u64,
    /// Maximum number of keys promoted per tick
    pub top_n: usize,
    /// QPS at or above which a key is hot
    pub hot_qps_threshold: f64,
    /// QPS below which a key is cold
    pub warm_qps_threshold: f64,
    /// Promotion tick interval in milliseconds
    pub promotion_interval_ms: u64,
    /// Run the demotion pass every Nth promotion tick
    pub demotion_multiplier: u32,
}

/// Adaptive sampling for keys without a full access window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// When false every access is staged (staging-only mode)
    pub enabled: bool,
    /// Staged count below which a key is sampled
    pub min_frequency: u64,
    /// Probability of recording a sampled access
    pub sampling_rate: f64,
    /// Attempt rate (per second) that bypasses sampling
    pub fast_admission_qps: f64,
    /// Rejections after which a key is force-admitted
    pub rejected_access_threshold: u32,
    /// Hash-based per-window decisions instead of random draws
    pub consistent_sampling: bool,
    /// Staging utilization below which the sampling rate is doubled
    pub capacity_usage_threshold: f64,
}

/// Frequency recorder memory bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Maximum number of full access windows
    pub max_capacity: usize,
    /// Inactivity after which an access window is dropped, in seconds
    pub inactive_expire_secs: u64,
    /// Maximum number of staging counters
    pub max_staging_capacity: usize,
    /// Floor for the staging to window promotion count
    pub min_staging_promotion_count: u64,
}

/// Default local value cache sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Maximum cached entries
    pub maximum_size: u64,
    /// Expire-after-write in minutes
    pub expire_after_write_mins: u64,
}

/// Refresh registry sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub enabled: bool,
    /// Sweep interval in milliseconds
    pub interval_ms: u64,
    /// Consecutive failures after which a key is evicted
    pub max_failure_count: u32,
}

/// Hit-rate statistics and periodic summary logging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Periodic summary logging
    pub enabled: bool,
    /// Summary interval in milliseconds
    pub interval_ms: u64,
    /// Statistics window in milliseconds
    pub window_ms: u64,
    /// Cap on distinct keys tracked per window
    pub max_window_keys: usize,
    /// Distinct-key purge interval in milliseconds
    pub cleanup_interval_ms: u64,
}

/// Background thread sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Access recording threads
    pub threads: usize,
    /// Bounded access queue length
    pub queue_capacity: usize,
    /// Bounded wait for graceful shutdown in milliseconds
    pub shutdown_timeout_ms: u64,
}

/// Complete hot-key configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotKeyConfig {
    /// When false `wrap_get` calls the source directly
    pub enabled: bool,
    pub detection: DetectionConfig,
    pub admission: AdmissionConfig,
    pub recorder: RecorderConfig,
    pub storage: StorageConfig,
    pub refresh: RefreshConfig,
    pub monitor: MonitorConfig,
    pub worker: WorkerConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_size_secs: 10,
            top_n: 20,
            hot_qps_threshold: 500.0,
            warm_qps_threshold: 200.0,
            promotion_interval_ms: 5_000,
            demotion_multiplier: 20,
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_frequency: 10,
            sampling_rate: 0.1,
            fast_admission_qps: 100.0,
            rejected_access_threshold: 1_000,
            consistent_sampling: true,
            capacity_usage_threshold: 0.5,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_capacity: 100_000,
            inactive_expire_secs: 120,
            max_staging_capacity: 1_000_000,
            min_staging_promotion_count: 100,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            maximum_size: DetectionConfig::default().top_n as u64 * 100,
            expire_after_write_mins: 60,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 10_000,
            max_failure_count: 3,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 60_000,
            window_ms: 10_000,
            max_window_keys: 100_000,
            cleanup_interval_ms: 5_000,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            queue_capacity: 10_000,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl Default for HotKeyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detection: DetectionConfig::default(),
            admission: AdmissionConfig::default(),
            recorder: RecorderConfig::default(),
            storage: StorageConfig::default(),
            refresh: RefreshConfig::default(),
            monitor: MonitorConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl DetectionConfig {
    #[inline(always)]
    pub fn window_ms(&self) -> u64 {
        self.window_size_secs.saturating_mul(1_000)
    }

    #[inline(always)]
    pub fn promotion_interval(&self) -> Duration {
        Duration::from_millis(self.promotion_interval_ms)
    }
}

impl RecorderConfig {
    #[inline(always)]
    pub fn inactive_expire_ms(&self) -> u64 {
        self.inactive_expire_secs.saturating_mul(1_000)
    }
}

impl StorageConfig {
    #[inline(always)]
    pub fn expire_after_write(&self) -> Duration {
        Duration::from_secs(self.expire_after_write_mins.saturating_mul(60))
    }
}

impl RefreshConfig {
    #[inline(always)]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl MonitorConfig {
    #[inline(always)]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl WorkerConfig {
    #[inline(always)]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl HotKeyConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::JsonParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Staged count at which a key receives a full access window
    pub fn staging_promotion_threshold(&self) -> u64 {
        let per_interval = self.detection.warm_qps_threshold
            * self.detection.promotion_interval_ms as f64
            / 1_000.0;
        (per_interval.max(0.0) as u64).max(self.recorder.min_staging_promotion_count)
    }

    /// Check every recognized option
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detection;
        positive("detection.window_size_secs", d.window_size_secs as f64)?;
        positive("detection.top_n", d.top_n as f64)?;
        positive("detection.hot_qps_threshold", d.hot_qps_threshold)?;
        if !(d.warm_qps_threshold >= 0.0 && d.warm_qps_threshold <= d.hot_qps_threshold) {
            return Err(ConfigError::invalid(
                "detection.warm_qps_threshold",
                d.warm_qps_threshold,
                "must be between 0 and hot_qps_threshold",
            ));
        }
        positive("detection.promotion_interval_ms", d.promotion_interval_ms as f64)?;
        positive("detection.demotion_multiplier", d.demotion_multiplier as f64)?;

        let a = &self.admission;
        fraction("admission.sampling_rate", a.sampling_rate)?;
        fraction("admission.capacity_usage_threshold", a.capacity_usage_threshold)?;
        positive("admission.fast_admission_qps", a.fast_admission_qps)?;
        positive(
            "admission.rejected_access_threshold",
            a.rejected_access_threshold as f64,
        )?;

        let r = &self.recorder;
        positive("recorder.max_capacity", r.max_capacity as f64)?;
        positive("recorder.inactive_expire_secs", r.inactive_expire_secs as f64)?;
        positive("recorder.max_staging_capacity", r.max_staging_capacity as f64)?;

        positive("storage.maximum_size", self.storage.maximum_size as f64)?;
        positive(
            "storage.expire_after_write_mins",
            self.storage.expire_after_write_mins as f64,
        )?;

        positive("refresh.interval_ms", self.refresh.interval_ms as f64)?;
        positive(
            "refresh.max_failure_count",
            self.refresh.max_failure_count as f64,
        )?;

        let m = &self.monitor;
        positive("monitor.interval_ms", m.interval_ms as f64)?;
        positive("monitor.window_ms", m.window_ms as f64)?;
        positive("monitor.max_window_keys", m.max_window_keys as f64)?;
        positive("monitor.cleanup_interval_ms", m.cleanup_interval_ms as f64)?;

        positive("worker.threads", self.worker.threads as f64)?;
        positive("worker.queue_capacity", self.worker.queue_capacity as f64)?;
        Ok(())
    }
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, value, "must be greater than zero"))
    }
}

fn fraction(field: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, value, "must be in (0, 1]"))
    }
}

/// Configuration errors reported once at startup
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidFieldValue {
        field: String,
        value: String,
        reason: String,
    },
    JsonParseError(String),
}

impl ConfigError {
    fn invalid(field: &str, value: impl ToString, reason: &str) -> Self {
        ConfigError::InvalidFieldValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidFieldValue {
                field,
                value,
                reason,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for field '{}': {}",
                    value, field, reason
                )
            }
            ConfigError::JsonParseError(msg) => write!(f, "JSON parsing error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for CacheOperationError {
    fn from(err: ConfigError) -> Self {
        CacheOperationError::configuration_error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HotKeyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.maximum_size, 2_000);
        assert_eq!(config.detection.window_ms(), 10_000);
    }

    #[test]
    fn test_staging_promotion_threshold() {
        let mut config = HotKeyConfig::default();
        // 200 qps over a 5 s interval
        assert_eq!(config.staging_promotion_threshold(), 1_000);

        config.detection.warm_qps_threshold = 1.0;
        config.detection.promotion_interval_ms = 1_000;
        assert_eq!(config.staging_promotion_threshold(), 100);
    }

    #[test]
    fn test_rejects_zero_top_n() {
        let mut config = HotKeyConfig::default();
        config.detection.top_n = 0;
        match config.validate() {
            Err(ConfigError::InvalidFieldValue { field, .. }) => {
                assert_eq!(field, "detection.top_n")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_warm_above_hot() {
        let mut config = HotKeyConfig::default();
        config.detection.warm_qps_threshold = 600.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_sampling_rate() {
        let mut config = HotKeyConfig::default();
        config.admission.sampling_rate = 0.0;
        assert!(config.validate().is_err());
        config.admission.sampling_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_refresh_interval() {
        let mut config = HotKeyConfig::default();
        config.refresh.interval_ms = 0;
        let err: CacheOperationError = config.validate().unwrap_err().into();
        assert!(matches!(err, CacheOperationError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = HotKeyConfig::from_json(
            r#"{ "detection": { "top_n": 5, "hot_qps_threshold": 3000.0 } }"#,
        )
        .unwrap();
        assert_eq!(config.detection.top_n, 5);
        assert_eq!(config.detection.hot_qps_threshold, 3000.0);
        assert_eq!(config.detection.warm_qps_threshold, 200.0);
        assert_eq!(config.refresh.max_failure_count, 3);
    }

    #[test]
    fn test_from_json_reports_parse_errors() {
        assert!(matches!(
            HotKeyConfig::from_json("{ not json"),
            Err(ConfigError::JsonParseError(_))
        ));
    }
}
