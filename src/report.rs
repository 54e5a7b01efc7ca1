use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::fs;

use crate::config::LoadTestConfig;
use crate::stats::Statistics;
use crate::trial::FailureKind;
use crate::verdict::Verdict;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    /// `None` when the failing user could not be identified.
    pub user_index: Option<usize>,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub concurrent_users: usize,
    pub requests_per_user: usize,
    pub total_requests: usize,
    pub worker_count: usize,
}

impl From<&LoadTestConfig> for ConfigSummary {
    fn from(config: &LoadTestConfig) -> Self {
        Self {
            concurrent_users: config.user_count,
            requests_per_user: config.requests_per_user,
            total_requests: config.total_requests(),
            worker_count: config.worker_count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadTestReport {
    pub timestamp: DateTime<Local>,
    pub target: String,
    pub config: ConfigSummary,
    pub results: Statistics,
    /// The first failure messages of the run, capped.
    pub errors: Vec<String>,
    pub verdict: Verdict,
    #[serde(skip)]
    pub failures: Vec<FailureRecord>,
}

impl LoadTestReport {
    pub fn file_name(&self) -> String {
        format!(
            "load-test-results-{}.json",
            self.timestamp.format("%Y%m%d_%H%M%S")
        )
    }

    /// Writes the report as pretty JSON into `dir`, creating it if needed.
    pub async fn write_json(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create results directory at {}", dir.display()))?;

        let path = dir.join(self.file_name());
        let body = serde_json::to_vec_pretty(self).context("failed to serialize report")?;
        fs::write(&path, body)
            .await
            .with_context(|| format!("failed to write results file {}", path.display()))?;

        Ok(path)
    }

    /// Distinct failure messages among the first ten failures, at most `limit`
    /// of them, each cut to 100 characters.
    pub fn sample_errors(&self, limit: usize) -> Vec<String> {
        let mut unique: Vec<String> = Vec::new();
        for failure in self.failures.iter().take(10) {
            let message: String = failure.message.chars().take(100).collect();
            if !unique.contains(&message) {
                unique.push(message);
            }
        }
        unique.truncate(limit);
        unique
    }
}
