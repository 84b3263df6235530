//! Frequency recorder: staging counters, access windows and admission sampling

pub mod access_window;
pub mod frequency_recorder;
pub mod sampler;
pub mod statistics;

pub use access_window::AccessWindow;
pub use frequency_recorder::{CleanupReport, FrequencyRecorder, RETAIN_RATIO};
pub use sampler::{AdmissionDecision, AdmissionSampler, SamplerSnapshot};
pub use statistics::RecorderStatistics;
