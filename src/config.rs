use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use crate::verdict::Thresholds;

/// Prompts cycled through by the full-size run.
pub const STANDARD_PROMPTS: &[&str] = &[
    "I need motivation today",
    "How do I stay on track?",
    "I want to lose weight",
    "I'm feeling discouraged",
    "What should I eat today?",
    "I lost 2 pounds this week!",
    "I'm struggling with cravings",
    "How can I exercise more?",
    "I gained weight this week",
    "Tell me about healthy habits",
];

/// Shorter prompt set used by the quick smoke run.
pub const SMOKE_PROMPTS: &[&str] = &[
    "I need motivation",
    "How do I stay on track?",
    "I want to lose weight",
    "I'm feeling discouraged",
    "I lost 2 pounds!",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preset {
    /// 100 concurrent users, one request each, 95% success required.
    Standard,
    /// 10 concurrent users, one request each, 90% success required and no
    /// latency ceiling.
    Smoke,
}

impl Preset {
    pub fn user_count(self) -> usize {
        match self {
            Preset::Standard => 100,
            Preset::Smoke => 10,
        }
    }

    pub fn prompts(self) -> Vec<String> {
        let set = match self {
            Preset::Standard => STANDARD_PROMPTS,
            Preset::Smoke => SMOKE_PROMPTS,
        };
        set.iter().map(|prompt| prompt.to_string()).collect()
    }

    pub fn thresholds(self) -> Thresholds {
        match self {
            Preset::Standard => Thresholds::default(),
            Preset::Smoke => Thresholds {
                min_success_rate: 90.0,
                max_avg_latency_ms: f64::INFINITY,
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoadTestConfig {
    /// Identifier of the endpoint under test, recorded in the summary.
    pub target: String,
    pub user_count: usize,
    pub requests_per_user: usize,
    /// Upper bound on simultaneously running user simulations.
    pub worker_count: usize,
    pub prompts: Vec<String>,
    /// A reply must be strictly longer than this many characters.
    pub min_response_chars: usize,
    pub thresholds: Thresholds,
    pub max_recorded_failures: usize,
    pub progress_every: usize,
}

impl LoadTestConfig {
    pub fn try_new(
        target: impl Into<String>,
        user_count: usize,
        requests_per_user: usize,
        prompts: Vec<String>,
    ) -> Result<Self> {
        let config = Self {
            target: target.into(),
            user_count,
            requests_per_user,
            worker_count: user_count,
            prompts,
            min_response_chars: 10,
            thresholds: Thresholds::default(),
            max_recorded_failures: 20,
            progress_every: 10,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_preset(target: impl Into<String>, preset: Preset) -> Result<Self> {
        Ok(Self::try_new(target, preset.user_count(), 1, preset.prompts())?
            .with_thresholds(preset.thresholds()))
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(anyhow!("worker_count must be greater than zero"));
        }
        self.worker_count = worker_count;
        Ok(self)
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_min_response_chars(mut self, min_response_chars: usize) -> Self {
        self.min_response_chars = min_response_chars;
        self
    }

    pub fn with_progress_every(mut self, progress_every: usize) -> Self {
        if progress_every > 0 {
            self.progress_every = progress_every;
        }
        self
    }

    /// Re-checks invariants that direct field edits can break.
    pub fn validate(&self) -> Result<()> {
        if self.user_count == 0 {
            return Err(anyhow!("user_count must be greater than zero"));
        }
        if self.requests_per_user == 0 {
            return Err(anyhow!("requests_per_user must be greater than zero"));
        }
        if self.prompts.is_empty() {
            return Err(anyhow!("at least one prompt is required"));
        }
        if self.worker_count == 0 {
            return Err(anyhow!("worker_count must be greater than zero"));
        }
        if self.progress_every == 0 {
            return Err(anyhow!("progress_every must be greater than zero"));
        }
        Ok(())
    }

    pub fn total_requests(&self) -> usize {
        self.user_count * self.requests_per_user
    }
}

/// Reads prompts from a JSONL file whose objects contain a `text` field.
pub fn load_prompts(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut prompts = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(trimmed)
            .with_context(|| format!("line {} is not valid JSON: {}", idx + 1, trimmed))?;
        let text = value
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("line {} missing string field `text`", idx + 1))?;
        prompts.push(text.to_string());
    }

    if prompts.is_empty() {
        return Err(anyhow!(
            "{} did not contain any JSON records with a `text` field",
            path.display()
        ));
    }

    Ok(prompts)
}
