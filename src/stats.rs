use std::time::Duration;

use serde::Serialize;

use crate::report::FailureRecord;
use crate::trial::{FailureKind, Outcome};
use crate::user::UserSummary;

/// Outcomes accumulated over one run, in arrival order.
#[derive(Clone, Debug, Default)]
pub struct ResultSet {
    latencies: Vec<Duration>,
    failures: Vec<FailureRecord>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, user_index: usize, outcome: Outcome) {
        match outcome {
            Outcome::Success { latency, .. } => self.latencies.push(latency),
            Outcome::Failure { kind, message, .. } => self.failures.push(FailureRecord {
                user_index: Some(user_index),
                kind,
                message,
            }),
        }
    }

    pub fn record_user(&mut self, summary: UserSummary) {
        let user_index = summary.user_index;
        for outcome in summary.outcomes {
            self.record(user_index, outcome);
        }
    }

    /// Records `count` failures for work whose outcomes never reached the
    /// orchestrator.
    pub fn record_lost(&mut self, count: usize, message: &str) {
        for _ in 0..count {
            self.failures.push(FailureRecord {
                user_index: None,
                kind: FailureKind::Aggregation,
                message: message.to_string(),
            });
        }
    }

    pub fn success_count(&self) -> usize {
        self.latencies.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn latencies(&self) -> &[Duration] {
        &self.latencies
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }
}

/// Aggregate figures for a run. Latency fields cover successful trials only
/// and are expressed in milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub total_requests: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage of `total_requests` that succeeded.
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub total_duration_ms: f64,
    pub requests_per_second: f64,
}

impl Statistics {
    pub fn compute(results: &ResultSet, total_requests: usize, total_duration: Duration) -> Self {
        let successful = results.success_count();
        let failed = results.failure_count();
        let success_rate = if total_requests > 0 {
            successful as f64 * 100.0 / total_requests as f64
        } else {
            0.0
        };

        let duration_secs = total_duration.as_secs_f64();
        let requests_per_second = if duration_secs > 0.0 {
            total_requests as f64 / duration_secs
        } else {
            0.0
        };

        let mut stats = Self {
            total_requests,
            successful,
            failed,
            success_rate,
            total_duration_ms: millis(total_duration),
            requests_per_second,
            ..Self::default()
        };

        let mut latencies = results.latencies().to_vec();
        if latencies.is_empty() {
            return stats;
        }
        latencies.sort();

        let sum: Duration = latencies.iter().sum();
        stats.avg_latency_ms = millis(sum) / latencies.len() as f64;
        stats.min_latency_ms = millis(latencies[0]);
        stats.max_latency_ms = millis(latencies[latencies.len() - 1]);
        stats.p50_latency_ms = percentile(&latencies, 0.50).map_or(0.0, millis);
        stats.p95_latency_ms = percentile(&latencies, 0.95).map_or(0.0, millis);
        stats.p99_latency_ms = percentile(&latencies, 0.99).map_or(0.0, millis);
        stats
    }
}

/// Nearest-rank percentile over ascending `sorted_latencies`, taking the
/// element at zero-based index `floor(quantile * n)` clamped to the last one.
pub fn percentile(sorted_latencies: &[Duration], quantile: f64) -> Option<Duration> {
    if sorted_latencies.is_empty() {
        return None;
    }

    let clamped = quantile.clamp(0.0, 1.0);
    let idx = (sorted_latencies.len() as f64 * clamped).floor() as usize;
    sorted_latencies
        .get(idx.min(sorted_latencies.len() - 1))
        .copied()
}

fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(ms: u64) -> Outcome {
        Outcome::Success {
            latency: Duration::from_millis(ms),
            response: "a perfectly fine reply".to_string(),
        }
    }

    fn failure(ms: u64) -> Outcome {
        Outcome::Failure {
            latency: Duration::from_millis(ms),
            kind: FailureKind::Invocation,
            message: "connection reset".to_string(),
        }
    }

    #[test]
    fn nearest_rank_on_five_samples() {
        let mut results = ResultSet::new();
        for (user, ms) in [100, 20, 40, 10, 30].into_iter().enumerate() {
            results.record(user, success(ms));
        }

        let stats = Statistics::compute(&results, 5, Duration::from_secs(1));
        assert_eq!(stats.p50_latency_ms, 30.0);
        assert_eq!(stats.p95_latency_ms, 100.0);
        assert_eq!(stats.p99_latency_ms, 100.0);
        assert_eq!(stats.avg_latency_ms, 40.0);
        assert_eq!(stats.min_latency_ms, 10.0);
        assert_eq!(stats.max_latency_ms, 100.0);
        assert_eq!(stats.requests_per_second, 5.0);
        assert_eq!(stats.total_duration_ms, 1000.0);
    }

    #[test]
    fn percentile_of_single_sample() {
        let sorted = [Duration::from_millis(7)];
        assert_eq!(percentile(&sorted, 0.99), Some(Duration::from_millis(7)));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn half_failures_give_fifty_percent() {
        let mut results = ResultSet::new();
        for trial in 0..10 {
            if trial % 2 == 0 {
                results.record(trial, failure(5));
            } else {
                results.record(trial, success(5));
            }
        }

        let stats = Statistics::compute(&results, 10, Duration::from_millis(50));
        assert_eq!(stats.success_rate, 50.0);
        assert_eq!(stats.successful + stats.failed, stats.total_requests);
    }

    #[test]
    fn failure_latencies_do_not_affect_latency_figures() {
        let mut results = ResultSet::new();
        results.record(0, success(10));
        results.record(1, failure(9_000));

        let stats = Statistics::compute(&results, 2, Duration::from_secs(2));
        assert_eq!(stats.max_latency_ms, 10.0);
        assert_eq!(stats.avg_latency_ms, 10.0);
    }

    #[test]
    fn no_successes_zeroes_latency_fields() {
        let mut results = ResultSet::new();
        results.record(0, failure(10));

        let stats = Statistics::compute(&results, 1, Duration::from_secs(1));
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.avg_latency_ms, 0.0);
        assert_eq!(stats.p99_latency_ms, 0.0);
        assert_eq!(stats.requests_per_second, 1.0);
    }

    #[test]
    fn compute_is_repeatable() {
        let mut results = ResultSet::new();
        results.record(0, success(12));
        results.record(1, success(3));
        results.record(2, failure(1));

        let first = Statistics::compute(&results, 3, Duration::from_millis(40));
        let second = Statistics::compute(&results, 3, Duration::from_millis(40));
        assert_eq!(first, second);
        assert_eq!(results.latencies()[0], Duration::from_millis(12));
    }

    #[test]
    fn lost_work_counts_as_aggregation_failures() {
        let mut results = ResultSet::new();
        results.record_lost(3, "task panicked");
        assert_eq!(results.failure_count(), 3);
        assert!(results
            .failures()
            .iter()
            .all(|f| f.kind == FailureKind::Aggregation && f.user_index.is_none()));
    }
}
