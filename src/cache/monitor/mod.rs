//! Observability snapshot for exporters and periodic logging

use serde::Serialize;

use crate::cache::recorder::RecorderStatistics;
use crate::cache::statistics::HitRateSnapshot;

/// Everything an external exporter needs in one serializable value
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorInfo {
    pub hot_keys: Vec<String>,
    pub hot_key_count: usize,
    pub storage_size: u64,
    pub recorder_size: usize,
    pub recorder_memory_bytes: u64,
    pub recorder_statistics: RecorderStatistics,
    pub registry_size: usize,
    pub total_wrap_get_count: u64,
    pub wrap_get_qps: f64,
    pub keys_per_second: f64,
    pub hot_key_access_count: u64,
    pub hot_key_hit_count: u64,
    pub hot_key_miss_count: u64,
    pub hit_rate: f64,
    pub traffic_ratio: f64,
    pub hot_key_access_qps: f64,
    pub hot_key_hit_qps: f64,
    pub hot_key_miss_qps: f64,
}

impl MonitorInfo {
    pub fn new(
        mut hot_keys: Vec<String>,
        storage_size: u64,
        recorder_statistics: RecorderStatistics,
        registry_size: usize,
        hits: &HitRateSnapshot,
    ) -> Self {
        hot_keys.sort();
        Self {
            hot_key_count: hot_keys.len(),
            hot_keys,
            storage_size,
            recorder_size: recorder_statistics.window_size,
            recorder_memory_bytes: recorder_statistics.total_memory_bytes,
            recorder_statistics,
            registry_size,
            total_wrap_get_count: hits.total_wrap_get_count,
            wrap_get_qps: hits.wrap_get_qps,
            keys_per_second: hits.keys_per_second,
            hot_key_access_count: hits.hot_key_access_count,
            hot_key_hit_count: hits.hot_key_hit_count,
            hot_key_miss_count: hits.hot_key_miss_count,
            hit_rate: hits.hit_rate,
            traffic_ratio: hits.traffic_ratio,
            hot_key_access_qps: hits.hot_key_access_qps,
            hot_key_hit_qps: hits.hot_key_hit_qps,
            hot_key_miss_qps: hits.hot_key_miss_qps,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// One-line summary for periodic logging
    pub fn log_summary(&self) {
        log::info!(
            "hot keys: count={} storage={} recorder={} (~{} bytes) registry={} | wrap_get total={} qps={:.1} keys/s={:.1} | hot access={} hit={} miss={} hit_rate={:.2}% traffic={:.2}%",
            self.hot_key_count,
            self.storage_size,
            self.recorder_size,
            self.recorder_memory_bytes,
            self.registry_size,
            self.total_wrap_get_count,
            self.wrap_get_qps,
            self.keys_per_second,
            self.hot_key_access_count,
            self.hot_key_hit_count,
            self.hot_key_miss_count,
            self.hit_rate * 100.0,
            self.traffic_ratio * 100.0,
        );
        log::debug!("hot key list: {:?}", self.hot_keys);
    }
}
