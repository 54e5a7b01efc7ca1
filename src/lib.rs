mod config;
mod invoker;
mod report;
mod runner;
mod scenario;
mod stats;
mod trial;
mod user;
mod verdict;

pub use config::{load_prompts, LoadTestConfig, Preset, SMOKE_PROMPTS, STANDARD_PROMPTS};
pub use invoker::{
    extract_text, HttpInvoker, HttpInvokerConfig, Invoke, InvokeError, DEFAULT_SESSION_HEADER,
};
pub use report::{ConfigSummary, FailureRecord, LoadTestReport};
pub use runner::run_load_test;
pub use scenario::{
    assess_latencies, builtin_suite, run_suite, Assessment, Check, LatencyBudget, Scenario,
    SessionMode, Step, StepResult, SuiteReport,
};
pub use stats::{percentile, ResultSet, Statistics};
pub use trial::{run_trial, FailureKind, Outcome, EMPTY_RESPONSE_MESSAGE};
pub use user::{select_prompt, simulate_user, UserSummary};
pub use verdict::{Thresholds, Verdict, Violation};
