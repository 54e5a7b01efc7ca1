use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::LoadTestConfig;
use crate::invoker::Invoke;
use crate::report::{ConfigSummary, LoadTestReport};
use crate::stats::{ResultSet, Statistics};
use crate::user::{simulate_user, UserSummary};
use crate::verdict::Verdict;

/// Runs every simulated user against `invoker` and aggregates the outcome.
///
/// All users are submitted up front; at most `worker_count` of them run at
/// once. Summaries are folded into the result set in completion order by this
/// task alone. A user task that is lost counts as `requests_per_user`
/// aggregation failures, so the success and failure counts always add up to
/// the planned total.
pub async fn run_load_test(
    config: LoadTestConfig,
    invoker: Arc<dyn Invoke>,
) -> Result<LoadTestReport> {
    config.validate().context("invalid load test configuration")?;

    let timestamp = Local::now();
    let start = Instant::now();
    let total_requests = config.total_requests();
    let config = Arc::new(config);
    let permits = Arc::new(Semaphore::new(config.worker_count));

    info!(
        endpoint = %config.target,
        users = config.user_count,
        requests_per_user = config.requests_per_user,
        workers = config.worker_count,
        total_requests,
        "starting load test"
    );

    let mut join_set = JoinSet::new();
    for user_index in 0..config.user_count {
        let config = Arc::clone(&config);
        let invoker = Arc::clone(&invoker);
        let permits = Arc::clone(&permits);
        join_set.spawn(async move { run_user(user_index, config, invoker, permits).await });
    }

    let mut results = ResultSet::new();
    let mut completed = 0usize;
    while let Some(join_result) = join_set.join_next().await {
        match join_result {
            Ok(Ok(summary)) => results.record_user(summary),
            Ok(Err(err)) => {
                warn!(error = %err, "error processing user result");
                results.record_lost(config.requests_per_user, &err.to_string());
            }
            Err(err) => {
                warn!(error = %err, "user task did not complete");
                results.record_lost(config.requests_per_user, &err.to_string());
            }
        }

        completed += 1;
        if completed % config.progress_every == 0 {
            info!(
                "progress: {}/{} users completed",
                completed, config.user_count
            );
        }
    }

    let total_duration = start.elapsed();
    let results_stats = Statistics::compute(&results, total_requests, total_duration);
    let verdict = Verdict::evaluate(&results_stats, &config.thresholds);

    info!(
        successful = results_stats.successful,
        failed = results_stats.failed,
        duration_ms = results_stats.total_duration_ms,
        "load test completed"
    );

    let failures = results.failures().to_vec();
    let errors = failures
        .iter()
        .take(config.max_recorded_failures)
        .map(|failure| failure.message.clone())
        .collect();

    Ok(LoadTestReport {
        timestamp,
        target: config.target.clone(),
        config: ConfigSummary::from(config.as_ref()),
        results: results_stats,
        errors,
        verdict,
        failures,
    })
}

async fn run_user(
    user_index: usize,
    config: Arc<LoadTestConfig>,
    invoker: Arc<dyn Invoke>,
    permits: Arc<Semaphore>,
) -> Result<UserSummary> {
    let _permit = permits
        .acquire_owned()
        .await
        .context("worker pool closed before user could start")?;

    Ok(simulate_user(
        user_index,
        config.requests_per_user,
        &config.prompts,
        invoker.as_ref(),
        config.min_response_chars,
    )
    .await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::InvokeError;
    use crate::trial::FailureKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails every even-numbered call, in call order.
    #[derive(Default)]
    struct Alternating {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Invoke for Alternating {
        async fn invoke(&self, _prompt: &str, _session_id: &str) -> Result<String, InvokeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call % 2 == 0 {
                Err(InvokeError::Rejected(format!("call {} refused", call)))
            } else {
                Ok("a long enough reply".to_string())
            }
        }
    }

    struct Sleepy {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Sleepy {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Invoke for Sleepy {
        async fn invoke(&self, _prompt: &str, _session_id: &str) -> Result<String, InvokeError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("a long enough reply".to_string())
        }
    }

    /// Panics on the prompt "boom".
    struct Explosive;

    #[async_trait]
    impl Invoke for Explosive {
        async fn invoke(&self, prompt: &str, _session_id: &str) -> Result<String, InvokeError> {
            if prompt == "boom" {
                panic!("collaborator exploded");
            }
            Ok("a long enough reply".to_string())
        }
    }

    fn config(users: usize, requests: usize, prompts: &[&str]) -> LoadTestConfig {
        LoadTestConfig::try_new(
            "stub",
            users,
            requests,
            prompts.iter().map(|p| p.to_string()).collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn counts_add_up_for_various_shapes() {
        for (users, requests) in [(1, 1), (3, 4), (10, 1), (7, 3)] {
            let invoker: Arc<dyn Invoke> = Arc::new(Alternating::default());
            let report = run_load_test(config(users, requests, &["hi"]), invoker)
                .await
                .unwrap();
            let stats = &report.results;
            assert_eq!(stats.total_requests, users * requests);
            assert_eq!(stats.successful + stats.failed, stats.total_requests);
        }
    }

    #[tokio::test]
    async fn half_failing_collaborator_gives_fifty_percent() {
        let invoker: Arc<dyn Invoke> = Arc::new(Alternating::default());
        let report = run_load_test(config(10, 2, &["hi"]), invoker).await.unwrap();

        assert_eq!(report.results.success_rate, 50.0);
        assert!(!report.verdict.is_pass());
        assert_eq!(report.errors.len(), 10);
        assert!(report
            .failures
            .iter()
            .all(|f| f.kind == FailureKind::Invocation));
    }

    #[tokio::test]
    async fn failure_messages_are_capped() {
        let invoker: Arc<dyn Invoke> = Arc::new(Alternating::default());
        let report = run_load_test(config(30, 2, &["hi"]), invoker).await.unwrap();

        assert_eq!(report.results.failed, 30);
        assert_eq!(report.errors.len(), 20);
        assert_eq!(report.failures.len(), 30);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn users_run_in_parallel() {
        let delay = Duration::from_millis(200);
        let invoker = Arc::new(Sleepy::new(delay));
        let report = run_load_test(config(20, 1, &["hi"]), invoker.clone())
            .await
            .unwrap();

        assert_eq!(report.results.successful, 20);
        assert_eq!(invoker.peak.load(Ordering::SeqCst), 20);
        assert!(report.results.total_duration_ms < 4.0 * delay.as_millis() as f64);
    }

    #[tokio::test]
    async fn worker_count_bounds_concurrency() {
        let invoker = Arc::new(Sleepy::new(Duration::from_millis(20)));
        let config = config(12, 1, &["hi"]).with_worker_count(3).unwrap();
        let report = run_load_test(config, invoker.clone()).await.unwrap();

        assert_eq!(report.results.successful, 12);
        assert!(invoker.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(report.config.worker_count, 3);
    }

    #[tokio::test]
    async fn zero_progress_interval_is_rejected_before_running() {
        let invoker = Arc::new(Alternating::default());
        let mut config = config(3, 1, &["hi"]);
        config.progress_every = 0;

        let err = run_load_test(config, invoker.clone()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("progress_every"));
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_workers_is_rejected_instead_of_hanging() {
        let invoker = Arc::new(Alternating::default());
        let mut config = config(3, 1, &["hi"]);
        config.worker_count = 0;

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            run_load_test(config, invoker.clone()),
        )
        .await
        .expect("run should return promptly");
        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("worker_count"));
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn panicking_user_is_recorded_not_fatal() {
        // users 0 and 1 reach "boom", user 2 never does
        let invoker: Arc<dyn Invoke> = Arc::new(Explosive);
        let report = run_load_test(config(3, 2, &["fine", "boom", "also fine"]), invoker)
            .await
            .unwrap();

        let stats = &report.results;
        assert_eq!(stats.total_requests, 6);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 4);
        assert!(report
            .failures
            .iter()
            .any(|f| f.kind == FailureKind::Aggregation));
    }
}
