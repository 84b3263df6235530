//! Recorder size and memory estimates

use serde::Serialize;

/// Average key length is sampled from at most this many keys
pub const KEY_SAMPLE_SIZE: usize = 100;

const MAP_BASE_BYTES: u64 = 48;
const MAP_SLOT_BYTES: u64 = 16;
const MAP_ENTRY_BYTES: u64 = 48;
const STRING_HEADER_BYTES: u64 = 24;
const WINDOW_BYTES: u64 = 80;
const STAGING_COUNTER_BYTES: u64 = 16;

/// Memory and size breakdown of the frequency recorder
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RecorderStatistics {
    pub staging_size: usize,
    pub staging_memory_bytes: u64,
    pub window_size: usize,
    pub window_memory_bytes: u64,
    pub total_size: usize,
    pub total_memory_bytes: u64,
    pub avg_key_length: f64,
}

#[inline(always)]
fn align8(bytes: u64) -> u64 {
    (bytes + 7) & !7
}

/// Heap estimate for one owned key of `avg_len` bytes
#[inline]
pub fn key_bytes(avg_len: f64) -> u64 {
    align8(STRING_HEADER_BYTES + avg_len.ceil() as u64)
}

/// Estimated bytes for a map of `entries` entries, each holding a key plus `value_bytes`
pub fn map_bytes(entries: usize, avg_key_len: f64, value_bytes: u64) -> u64 {
    if entries == 0 {
        return 0;
    }
    let per_entry = key_bytes(avg_key_len) + value_bytes + MAP_ENTRY_BYTES;
    MAP_BASE_BYTES + entries as u64 * (per_entry + MAP_SLOT_BYTES)
}

impl RecorderStatistics {
    pub fn new(staging_size: usize, window_size: usize, avg_key_length: f64) -> Self {
        let staging_memory_bytes = map_bytes(staging_size, avg_key_length, STAGING_COUNTER_BYTES);
        let window_memory_bytes = map_bytes(window_size, avg_key_length, WINDOW_BYTES);
        Self {
            staging_size,
            staging_memory_bytes,
            window_size,
            window_memory_bytes,
            total_size: staging_size + window_size,
            total_memory_bytes: staging_memory_bytes + window_memory_bytes,
            avg_key_length,
        }
    }
}

/// Mean length over the sampled keys, 0 when there are none
pub fn average_key_length<'a>(keys: impl Iterator<Item = &'a str>) -> f64 {
    let (total, count) = keys
        .take(KEY_SAMPLE_SIZE)
        .fold((0usize, 0usize), |(total, count), key| {
            (total + key.len(), count + 1)
        });
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}
