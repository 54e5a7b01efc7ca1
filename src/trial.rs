use std::time::{Duration, Instant};

use serde::Serialize;

use crate::invoker::Invoke;

pub const EMPTY_RESPONSE_MESSAGE: &str = "Empty or too short response";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The call itself failed.
    Invocation,
    /// The call returned, but with an empty or trivially short reply.
    EmptyResponse,
    /// The user simulation was lost before its outcomes were collected.
    Aggregation,
}

#[derive(Clone, Debug)]
pub enum Outcome {
    Success {
        latency: Duration,
        response: String,
    },
    Failure {
        latency: Duration,
        kind: FailureKind,
        message: String,
    },
}

impl Outcome {
    pub fn latency(&self) -> Duration {
        match self {
            Outcome::Success { latency, .. } | Outcome::Failure { latency, .. } => *latency,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Issues one prompt and classifies the result. Errors from the invoker are
/// folded into the outcome.
pub async fn run_trial(
    invoker: &dyn Invoke,
    prompt: &str,
    session_id: &str,
    min_response_chars: usize,
) -> Outcome {
    let start = Instant::now();
    let result = invoker.invoke(prompt, session_id).await;
    let latency = start.elapsed();

    match result {
        Ok(response) if response.chars().count() > min_response_chars => {
            Outcome::Success { latency, response }
        }
        Ok(_) => Outcome::Failure {
            latency,
            kind: FailureKind::EmptyResponse,
            message: EMPTY_RESPONSE_MESSAGE.to_string(),
        },
        Err(err) => Outcome::Failure {
            latency,
            kind: FailureKind::Invocation,
            message: err.to_string(),
        },
    }
}
