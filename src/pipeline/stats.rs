//! Request statistics for the inference service.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Counters over all `analyze` calls made while the service was ready.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisStats {
    pub total_requests: usize,
    pub successful: usize,
    pub failed: usize,
    /// Mean wall time per request in milliseconds.
    pub average_latency_ms: f64,
}

impl AnalysisStats {
    /// Share of successful requests, as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful as f64 / self.total_requests as f64 * 100.0
        }
    }
}

impl fmt::Display for AnalysisStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requests, {} ok ({:.1}%), {} failed, {:.2} ms average",
            self.total_requests,
            self.successful,
            self.success_rate(),
            self.failed,
            self.average_latency_ms
        )
    }
}

/// Thread-safe accumulator behind [`AnalysisStats`].
#[derive(Debug, Default)]
pub struct StatsRecorder {
    stats: Mutex<AnalysisStats>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> AnalysisStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records one finished request.
    pub fn record(&self, success: bool, elapsed: Duration) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = stats.total_requests as f64;
        stats.total_requests += 1;
        if success {
            stats.successful += 1;
        } else {
            stats.failed += 1;
        }
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        stats.average_latency_ms =
            (stats.average_latency_ms * previous + elapsed_ms) / stats.total_requests as f64;
    }

    pub fn reset(&self) {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner) = AnalysisStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_handles_zero_requests() {
        assert_eq!(AnalysisStats::default().success_rate(), 0.0);
    }

    #[test]
    fn recorder_tracks_counts_and_average() {
        let recorder = StatsRecorder::new();
        recorder.record(true, Duration::from_millis(100));
        recorder.record(false, Duration::from_millis(200));

        let stats = recorder.snapshot();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.failed, 1);
        assert!((stats.average_latency_ms - 150.0).abs() < 1e-9);
        assert_eq!(stats.success_rate(), 50.0);
        assert!(stats.to_string().contains("2 requests, 1 ok (50.0%)"));

        recorder.reset();
        assert_eq!(recorder.snapshot(), AnalysisStats::default());
    }
}
