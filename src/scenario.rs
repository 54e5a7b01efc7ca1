use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::invoker::{Invoke, InvokeError};

#[derive(Clone, Debug)]
pub enum Check {
    /// Any non-empty reply.
    Responds,
    /// Reply strictly longer than the given number of characters.
    MinLength(usize),
    /// Reply mentions at least one keyword, case-insensitively.
    ContainsAny(Vec<String>),
    /// Non-empty reply within the latency budget.
    MaxLatency(Duration),
    /// The agent must not return an empty reply; an invocation error is
    /// acceptable and counts as handled.
    Survives,
}

impl Check {
    pub fn contains_any(keywords: &[&str]) -> Self {
        Check::ContainsAny(keywords.iter().map(|k| k.to_string()).collect())
    }

    /// Returns `Ok(note)` when the step passes, `Err(reason)` otherwise.
    pub fn evaluate(
        &self,
        result: &Result<String, InvokeError>,
        latency: Duration,
    ) -> Result<String, String> {
        let response = match (self, result) {
            (Check::Survives, Err(err)) => {
                let note: String = err.to_string().chars().take(50).collect();
                return Ok(format!("Exception handled: {}", note));
            }
            (_, Err(err)) => return Err(format!("Agent invocation failed: {}", err)),
            (_, Ok(response)) => response,
        };

        match self {
            Check::Responds | Check::Survives if response.is_empty() => {
                Err("No response".to_string())
            }
            Check::Responds | Check::Survives => Ok(String::new()),
            Check::MinLength(min) if response.chars().count() > *min => Ok(String::new()),
            Check::MinLength(_) => Err("Response too short".to_string()),
            Check::ContainsAny(keywords) => {
                let lowered = response.to_lowercase();
                if keywords.iter().any(|k| lowered.contains(&k.to_lowercase())) {
                    Ok(String::new())
                } else {
                    Err(format!("Missing any of: {}", keywords.join(", ")))
                }
            }
            Check::MaxLatency(limit) => {
                let ms = latency.as_millis();
                if response.is_empty() {
                    Err("No response".to_string())
                } else if latency < *limit {
                    Ok(format!("{}ms", ms))
                } else {
                    Err(format!("{}ms > {}ms", ms, limit.as_millis()))
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Step {
    pub name: String,
    pub prompt: String,
    pub check: Check,
}

impl Step {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>, check: Check) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            check,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionMode {
    /// All steps share one conversation.
    Shared,
    /// Every step opens a new conversation.
    PerStep,
}

#[derive(Clone, Debug)]
pub struct Scenario {
    pub name: String,
    pub session: SessionMode,
    pub assessment: Assessment,
    pub steps: Vec<Step>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencyBudget {
    /// Mean latency of answered calls must stay below this.
    pub max_average: Duration,
    /// Slowest answered call must stay below this.
    pub max_single: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assessment {
    /// Each step's [`Check`] produces its own result.
    PerStep,
    /// Step checks are ignored; the latencies of calls that returned a reply
    /// are judged together, yielding an "Average" and a "Max" result.
    Latency(LatencyBudget),
}

#[derive(Clone, Debug, Serialize)]
pub struct StepResult {
    pub scenario: String,
    pub step: String,
    pub passed: bool,
    pub message: String,
    pub latency_ms: u128,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SuiteReport {
    pub results: Vec<StepResult>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        self.passed() as f64 / self.results.len() as f64 * 100.0
    }

    pub fn exit_code(&self) -> i32 {
        if self.failed() == 0 {
            0
        } else {
            1
        }
    }
}

/// Runs every scenario in order, pausing between steps.
pub async fn run_suite(
    scenarios: &[Scenario],
    invoker: &dyn Invoke,
    pause: Duration,
) -> SuiteReport {
    let mut report = SuiteReport::default();

    for scenario in scenarios {
        info!(scenario = %scenario.name, steps = scenario.steps.len(), "running scenario");
        let shared_session = Uuid::new_v4().to_string();
        let mut answered = Vec::new();

        for (idx, step) in scenario.steps.iter().enumerate() {
            if idx > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }

            let session_id = match scenario.session {
                SessionMode::Shared => shared_session.clone(),
                SessionMode::PerStep => Uuid::new_v4().to_string(),
            };

            let start = Instant::now();
            let result = invoker.invoke(&step.prompt, &session_id).await;
            let latency = start.elapsed();

            if let Assessment::Latency(_) = scenario.assessment {
                match &result {
                    Ok(_) => answered.push(latency),
                    Err(err) => {
                        warn!(scenario = %scenario.name, step = %step.name, error = %err, "call failed")
                    }
                }
                continue;
            }

            let (passed, message) = match step.check.evaluate(&result, latency) {
                Ok(note) => (true, note),
                Err(reason) => {
                    warn!(scenario = %scenario.name, step = %step.name, %reason, "step failed");
                    (false, reason)
                }
            };

            report.results.push(StepResult {
                scenario: scenario.name.clone(),
                step: step.name.clone(),
                passed,
                message,
                latency_ms: latency.as_millis(),
            });
        }

        if let Assessment::Latency(budget) = scenario.assessment {
            report
                .results
                .extend(assess_latencies(&scenario.name, &answered, &budget));
        }
    }

    report
}

/// Judges a set of answered-call latencies against `budget`. Both limits are
/// exclusive. With no answered calls a single failed result is returned.
pub fn assess_latencies(
    scenario: &str,
    latencies: &[Duration],
    budget: &LatencyBudget,
) -> Vec<StepResult> {
    let result = |step: &str, passed: bool, message: String, latency: Duration| StepResult {
        scenario: scenario.to_string(),
        step: step.to_string(),
        passed,
        message,
        latency_ms: latency.as_millis(),
    };

    let Some(max) = latencies.iter().max().copied() else {
        return vec![result(
            "All",
            false,
            "No successful tests".to_string(),
            Duration::ZERO,
        )];
    };
    let total: Duration = latencies.iter().sum();
    let average = total / latencies.len() as u32;

    let judge = |step: &str, observed: Duration, limit: Duration| {
        let passed = observed < limit;
        let message = if passed {
            format!("{}ms", observed.as_millis())
        } else {
            format!("{}ms > {}ms", observed.as_millis(), limit.as_millis())
        };
        result(step, passed, message, observed)
    };

    vec![
        judge("Average", average, budget.max_average),
        judge("Max", max, budget.max_single),
    ]
}

/// The default conversation suite for a coaching agent.
pub fn builtin_suite() -> Vec<Scenario> {
    let goal = Check::contains_any(&["goal", "plan", "achieve", "realistic", "step"]);
    let coaching =
        Check::contains_any(&["progress", "great", "keep", "continue", "proud", "understand"]);

    vec![
        Scenario {
            name: "Basic Invocation".to_string(),
            session: SessionMode::PerStep,
            assessment: Assessment::PerStep,
            steps: vec![Step::new("hello", "Hello", Check::Responds)],
        },
        Scenario {
            name: "Onboarding".to_string(),
            session: SessionMode::Shared,
            assessment: Assessment::PerStep,
            steps: vec![
                Step::new(
                    "introduction",
                    "I'm new here and want to start my weight loss journey",
                    Check::MinLength(20),
                ),
                Step::new("goal_statement", "I want to lose weight", Check::MinLength(20)),
                Step::new("medication_disclosure", "I'm on Ozempic", Check::MinLength(20)),
                Step::new("coaching_style", "I prefer gentle coaching", Check::MinLength(20)),
            ],
        },
        Scenario {
            name: "Goal Setting".to_string(),
            session: SessionMode::Shared,
            assessment: Assessment::PerStep,
            steps: vec![
                Step::new("realistic_goal", "I want to lose 10 pounds in 3 months", goal.clone()),
                Step::new(
                    "maintenance_goal",
                    "My goal is to maintain my current weight",
                    goal.clone(),
                ),
                Step::new(
                    "transition_goal",
                    "I want to transition off my medication",
                    goal.clone(),
                ),
                Step::new("unrealistic_goal", "I want to lose 50 pounds in 1 month", goal),
            ],
        },
        Scenario {
            name: "Progress".to_string(),
            session: SessionMode::Shared,
            assessment: Assessment::PerStep,
            steps: vec![
                Step::new("positive_progress", "I lost 2 pounds this week!", coaching.clone()),
                Step::new("setback", "I gained a pound this week", coaching.clone()),
                Step::new("plateau", "My weight stayed the same", coaching.clone()),
                Step::new("non_scale_victory", "I'm feeling more energetic", coaching),
            ],
        },
        Scenario {
            name: "Robustness".to_string(),
            session: SessionMode::PerStep,
            assessment: Assessment::PerStep,
            steps: vec![
                Step::new("very_long_input", "a".repeat(10_000), Check::Survives),
                Step::new("emoji_only", "🎉🎊🎈", Check::Survives),
                Step::new("off_topic", "What's the weather?", Check::Survives),
            ],
        },
        Scenario {
            name: "Response Time".to_string(),
            session: SessionMode::PerStep,
            assessment: Assessment::Latency(LatencyBudget {
                max_average: Duration::from_secs(5),
                max_single: Duration::from_secs(10),
            }),
            steps: (1..=5)
                .map(|i| {
                    Step::new(
                        format!("tip_{}", i),
                        format!("Give me a quick tip for staying motivated (test {})", i),
                        Check::Responds,
                    )
                })
                .collect(),
        },
    ]
}
