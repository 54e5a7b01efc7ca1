use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::invoker::Invoke;
use crate::trial::{run_trial, Outcome};

/// Picks the prompt for a user's `request_index`-th request, offset by the
/// user index so concurrent users start on different prompts.
pub fn select_prompt(prompts: &[String], user_index: usize, request_index: usize) -> &str {
    &prompts[(user_index + request_index) % prompts.len()]
}

#[derive(Clone, Debug)]
pub struct UserSummary {
    pub user_index: usize,
    pub session_id: String,
    pub outcomes: Vec<Outcome>,
}

impl UserSummary {
    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.len() - self.successes()
    }

    pub fn latencies(&self) -> Vec<Duration> {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(Outcome::latency)
            .collect()
    }
}

/// Runs one simulated user: a fresh session, then `requests_per_user`
/// sequential trials within it.
pub async fn simulate_user(
    user_index: usize,
    requests_per_user: usize,
    prompts: &[String],
    invoker: &dyn Invoke,
    min_response_chars: usize,
) -> UserSummary {
    let session_id = Uuid::new_v4().to_string();
    let mut outcomes = Vec::with_capacity(requests_per_user);

    for request_index in 0..requests_per_user {
        let prompt = select_prompt(prompts, user_index, request_index);
        let outcome = run_trial(invoker, prompt, &session_id, min_response_chars).await;
        if let Outcome::Failure { message, .. } = &outcome {
            debug!(user_index, request_index, error = %message, "trial failed");
        }
        outcomes.push(outcome);
    }

    UserSummary {
        user_index,
        session_id,
        outcomes,
    }
}
