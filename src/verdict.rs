use std::fmt;

use serde::Serialize;

use crate::stats::Statistics;

/// Acceptance limits applied to a finished run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Thresholds {
    /// Minimum success rate in percent (inclusive).
    pub min_success_rate: f64,
    /// Average latency ceiling in milliseconds (exclusive).
    pub max_avg_latency_ms: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_success_rate: 95.0,
            max_avg_latency_ms: 15_000.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "threshold", rename_all = "snake_case")]
pub enum Violation {
    SuccessRate { actual: f64, required: f64 },
    AverageLatency { actual_ms: f64, limit_ms: f64 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::SuccessRate { actual, required } => {
                write!(f, "Success rate: {:.1}% (< {}%)", actual, required)
            }
            Violation::AverageLatency {
                actual_ms,
                limit_ms,
            } => write!(
                f,
                "Avg response time: {:.0}ms (>= {}ms)",
                actual_ms, limit_ms
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail { violations: Vec<Violation> },
}

impl Verdict {
    pub fn evaluate(stats: &Statistics, thresholds: &Thresholds) -> Self {
        let mut violations = Vec::new();
        if stats.success_rate < thresholds.min_success_rate {
            violations.push(Violation::SuccessRate {
                actual: stats.success_rate,
                required: thresholds.min_success_rate,
            });
        }
        if stats.avg_latency_ms >= thresholds.max_avg_latency_ms {
            violations.push(Violation::AverageLatency {
                actual_ms: stats.avg_latency_ms,
                limit_ms: thresholds.max_avg_latency_ms,
            });
        }

        if violations.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Fail { violations }
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_pass() {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(success_rate: f64, avg_latency_ms: f64) -> Statistics {
        Statistics {
            success_rate,
            avg_latency_ms,
            ..Statistics::default()
        }
    }

    #[test]
    fn boundary_success_rate_passes() {
        let verdict = Verdict::evaluate(&stats(95.0, 14_999.0), &Thresholds::default());
        assert_eq!(verdict, Verdict::Pass);
        assert_eq!(verdict.exit_code(), 0);
    }

    #[test]
    fn low_success_rate_fails_citing_rate() {
        let verdict = Verdict::evaluate(&stats(94.9, 100.0), &Thresholds::default());
        let Verdict::Fail { violations } = &verdict else {
            panic!("expected failure, got {:?}", verdict);
        };
        assert_eq!(violations.len(), 1);
        assert!(matches!(violations[0], Violation::SuccessRate { .. }));
        assert!(violations[0].to_string().contains("Success rate: 94.9%"));
        assert_eq!(verdict.exit_code(), 1);
    }

    #[test]
    fn latency_ceiling_is_exclusive() {
        let verdict = Verdict::evaluate(&stats(100.0, 15_000.0), &Thresholds::default());
        let Verdict::Fail { violations } = verdict else {
            panic!("expected failure");
        };
        assert_eq!(
            violations,
            vec![Violation::AverageLatency {
                actual_ms: 15_000.0,
                limit_ms: 15_000.0
            }]
        );
    }

    #[test]
    fn unbounded_latency_ceiling_ignores_slow_runs() {
        let thresholds = Thresholds {
            min_success_rate: 90.0,
            max_avg_latency_ms: f64::INFINITY,
        };
        assert!(Verdict::evaluate(&stats(90.0, 60_000.0), &thresholds).is_pass());
        assert!(!Verdict::evaluate(&stats(80.0, 10.0), &thresholds).is_pass());
    }

    #[test]
    fn reports_every_violated_threshold() {
        let verdict = Verdict::evaluate(&stats(50.0, 20_000.0), &Thresholds::default());
        let Verdict::Fail { violations } = verdict else {
            panic!("expected failure");
        };
        assert_eq!(violations.len(), 2);
    }
}
