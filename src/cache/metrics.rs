//! Cache Metrics Module
//!
//! Process-wide counters for hits, misses, cleanups, privacy events and
//! storage usage, plus a bounded window of recent response times.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

/// Default number of response-time samples kept
pub const DEFAULT_WINDOW_CAPACITY: usize = 1000;

// == Internal State ==
#[derive(Debug, Default)]
struct MetricsState {
    hit_count: u64,
    miss_count: u64,
    cleanup_count: u64,
    bytes_reclaimed: u64,
    privacy_violations: u64,
    sanitization_count: u64,
    total_size: u64,
    entry_count: u64,
    response_times: VecDeque<f64>,
}

// == Reports ==
/// Aggregate over the rolling response-time window, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseTimeStats {
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub median_ms: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageReport {
    pub total_size: u64,
    pub entry_count: u64,
    pub max_size: u64,
    pub utilization: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupStats {
    pub cleanup_count: u64,
    pub bytes_reclaimed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrivacyReport {
    pub sanitizations: u64,
    pub violations: u64,
    pub sanitization_rate: f64,
}

/// Point-in-time view of every metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub response_times: ResponseTimeStats,
    pub storage: StorageReport,
    pub cleanup: CleanupStats,
    pub privacy: PrivacyReport,
}

// == Metrics Collector ==
/// Thread-safe metrics sink shared by the store and the sanitizer.
///
/// A single mutex guards all counters and the sample window.
#[derive(Debug)]
pub struct MetricsCollector {
    state: Mutex<MetricsState>,
    window_capacity: usize,
    max_cache_size: u64,
}

impl MetricsCollector {
    // == Constructor ==
    /// Creates a collector reporting utilization against `max_cache_size`.
    pub fn new(max_cache_size: u64) -> Self {
        Self::with_window(max_cache_size, DEFAULT_WINDOW_CAPACITY)
    }

    pub fn with_window(max_cache_size: u64, window_capacity: usize) -> Self {
        let window_capacity = window_capacity.max(1);
        Self {
            state: Mutex::new(MetricsState {
                response_times: VecDeque::with_capacity(window_capacity),
                ..MetricsState::default()
            }),
            window_capacity,
            max_cache_size,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        // Counters stay meaningful even if a holder panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // == Recorders ==
    pub fn record_hit(&self, elapsed: Duration) {
        let mut state = self.lock();
        state.hit_count += 1;
        self.push_sample(&mut state, elapsed);
    }

    pub fn record_miss(&self, elapsed: Duration) {
        let mut state = self.lock();
        state.miss_count += 1;
        self.push_sample(&mut state, elapsed);
    }

    /// Records entries reclaimed by expiry cleanup, eviction or clear.
    pub fn record_cleanup(&self, count: u64, bytes: u64) {
        let mut state = self.lock();
        state.cleanup_count += count;
        state.bytes_reclaimed += bytes;
        state.entry_count = state.entry_count.saturating_sub(count);
        state.total_size = state.total_size.saturating_sub(bytes);
    }

    pub fn record_privacy_violation(&self) {
        self.lock().privacy_violations += 1;
    }

    pub fn record_sanitization(&self) {
        self.lock().sanitization_count += 1;
    }

    /// Accounts for a freshly written entry.
    pub fn record_write(&self, bytes: u64) {
        let mut state = self.lock();
        state.entry_count += 1;
        state.total_size += bytes;
    }

    /// Accounts for an explicitly deleted or replaced entry.
    pub fn record_removal(&self, bytes: u64) {
        let mut state = self.lock();
        state.entry_count = state.entry_count.saturating_sub(1);
        state.total_size = state.total_size.saturating_sub(bytes);
    }

    /// Overwrites the storage counters with values from a directory scan.
    pub fn reset_storage(&self, total_size: u64, entry_count: u64) {
        let mut state = self.lock();
        state.total_size = total_size;
        state.entry_count = entry_count;
    }

    fn push_sample(&self, state: &mut MetricsState, elapsed: Duration) {
        if state.response_times.len() == self.window_capacity {
            state.response_times.pop_front();
        }
        state.response_times.push_back(elapsed.as_secs_f64() * 1000.0);
    }

    // == Readers ==
    /// hits / (hits + misses), or 0.0 before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let state = self.lock();
        ratio(state.hit_count, state.hit_count + state.miss_count, 0.0)
    }

    /// total_size / max_cache_size.
    pub fn storage_utilization(&self) -> f64 {
        let state = self.lock();
        self.utilization(&state)
    }

    pub fn response_time_stats(&self) -> ResponseTimeStats {
        let state = self.lock();
        window_stats(&state.response_times)
    }

    /// sanitizations / (sanitizations + violations), or 1.0 when both are zero.
    pub fn sanitization_rate(&self) -> f64 {
        let state = self.lock();
        ratio(
            state.sanitization_count,
            state.sanitization_count + state.privacy_violations,
            1.0,
        )
    }

    pub fn miss_count(&self) -> u64 {
        self.lock().miss_count
    }

    pub fn hit_count(&self) -> u64 {
        self.lock().hit_count
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.lock();
        MetricsSnapshot {
            hits: state.hit_count,
            misses: state.miss_count,
            hit_ratio: ratio(state.hit_count, state.hit_count + state.miss_count, 0.0),
            response_times: window_stats(&state.response_times),
            storage: StorageReport {
                total_size: state.total_size,
                entry_count: state.entry_count,
                max_size: self.max_cache_size,
                utilization: self.utilization(&state),
            },
            cleanup: CleanupStats {
                cleanup_count: state.cleanup_count,
                bytes_reclaimed: state.bytes_reclaimed,
            },
            privacy: PrivacyReport {
                sanitizations: state.sanitization_count,
                violations: state.privacy_violations,
                sanitization_rate: ratio(
                    state.sanitization_count,
                    state.sanitization_count + state.privacy_violations,
                    1.0,
                ),
            },
        }
    }

    fn utilization(&self, state: &MetricsState) -> f64 {
        if self.max_cache_size == 0 {
            0.0
        } else {
            state.total_size as f64 / self.max_cache_size as f64
        }
    }
}

fn ratio(part: u64, whole: u64, empty: f64) -> f64 {
    if whole == 0 {
        empty
    } else {
        part as f64 / whole as f64
    }
}

fn window_stats(samples: &VecDeque<f64>) -> ResponseTimeStats {
    if samples.is_empty() {
        return ResponseTimeStats::default();
    }

    let mut sorted: Vec<f64> = samples.iter().copied().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let median_ms = if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    };

    ResponseTimeStats {
        avg_ms: sorted.iter().sum::<f64>() / n as f64,
        min_ms: sorted[0],
        max_ms: sorted[n - 1],
        median_ms,
        samples: n,
    }
}
