//! Stateless promotion and demotion selection
//!
//! Every call is a pure function of the current hot-key set and the recorder's
//! statistics at that moment.

use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::config::HotKeyConfig;
use crate::cache::recorder::FrequencyRecorder;

/// Computes promotion and demotion candidates from recorder statistics
#[derive(Debug, Clone)]
pub struct HotKeySelector {
    config: Arc<HotKeyConfig>,
    recorder: Arc<FrequencyRecorder>,
}

impl HotKeySelector {
    pub fn new(config: Arc<HotKeyConfig>, recorder: Arc<FrequencyRecorder>) -> Self {
        Self { config, recorder }
    }

    /// Top-N keys at or above the hot threshold that are not already hot
    pub fn promote(&self, current: &HashSet<String>) -> Vec<String> {
        let mut candidates: Vec<(String, f64)> = self
            .recorder
            .get_hot_keys(self.config.detection.hot_qps_threshold)
            .into_iter()
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

        candidates
            .into_iter()
            .take(self.config.detection.top_n)
            .map(|(key, _)| key)
            .filter(|key| !current.contains(key))
            .collect()
    }

    /// Hot keys that fell below the hot threshold or lost their statistics
    ///
    /// Also runs recorder cleanup when the recorder is over capacity.
    pub fn demote(&self, current: &HashSet<String>) -> Vec<String> {
        let threshold = self.config.detection.hot_qps_threshold;
        let demoted = current
            .iter()
            .filter(|key| self.recorder.qps(key).unwrap_or(0.0) < threshold)
            .cloned()
            .collect();

        if self.recorder.size() > self.config.recorder.max_capacity {
            self.recorder.cleanup();
        }
        demoted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::types::clock::ManualClock;

    fn setup(tweak: impl FnOnce(&mut HotKeyConfig)) -> (HotKeySelector, Arc<FrequencyRecorder>) {
        let mut config = HotKeyConfig::default();
        config.admission.enabled = false;
        config.recorder.min_staging_promotion_count = 1;
        config.detection.warm_qps_threshold = 0.0;
        config.detection.hot_qps_threshold = 5.0;
        tweak(&mut config);
        let config = Arc::new(config);
        let clock = Arc::new(ManualClock::new(0));
        let recorder = Arc::new(FrequencyRecorder::new(config.clone(), clock));
        (HotKeySelector::new(config, recorder.clone()), recorder)
    }

    fn hit(recorder: &FrequencyRecorder, key: &str, times: usize) {
        for _ in 0..times {
            recorder.record_access(key);
        }
    }

    #[test]
    fn test_promote_orders_by_qps_and_limits_top_n() {
        let (selector, recorder) = setup(|c| c.detection.top_n = 2);
        hit(&recorder, "a", 60);
        hit(&recorder, "b", 80);
        hit(&recorder, "c", 70);
        hit(&recorder, "cold", 10);

        let promoted = selector.promote(&HashSet::new());
        assert_eq!(promoted, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_promote_skips_already_hot() {
        let (selector, recorder) = setup(|_| {});
        hit(&recorder, "a", 60);
        hit(&recorder, "b", 80);

        let current: HashSet<String> = ["b".to_string()].into_iter().collect();
        assert_eq!(selector.promote(&current), vec!["a".to_string()]);
    }

    #[test]
    fn test_demote_below_threshold_and_missing() {
        let (selector, recorder) = setup(|_| {});
        hit(&recorder, "still-hot", 100);
        hit(&recorder, "cooling", 10);

        let current: HashSet<String> = ["still-hot", "cooling", "unknown"]
            .into_iter()
            .map(String::from)
            .collect();
        let mut demoted = selector.demote(&current);
        demoted.sort();
        assert_eq!(demoted, vec!["cooling".to_string(), "unknown".to_string()]);
    }

    #[test]
    fn test_demote_triggers_capacity_cleanup() {
        let (selector, recorder) = setup(|c| c.recorder.max_capacity = 10);
        for i in 0..20 {
            hit(&recorder, &format!("k{}", i), 1);
        }
        assert!(selector.demote(&HashSet::new()).is_empty());
        assert_eq!(recorder.size(), 8);
    }
}
