//! Flow execution metrics
//!
//! Recorded through the `metrics` facade; without an installed recorder these
//! calls are no-ops.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::domain::FlowError;

/// Outcome label for a finished run
pub fn run_outcome(result: &Result<(), &FlowError>) -> &'static str {
    match result {
        Ok(()) => "completed",
        Err(FlowError::Cancelled(_)) => "cancelled",
        Err(e) if e.is_validation_failure() => "invalid",
        Err(_) => "failed",
    }
}

/// Outcome label for a single step attempt
pub fn attempt_outcome(result: &Result<(), &FlowError>) -> &'static str {
    match result {
        Ok(()) => "success",
        Err(FlowError::Timeout { .. }) => "timeout",
        Err(e) if e.is_retryable() => "retryable",
        Err(_) => "fatal",
    }
}

/// Record a finished flow run
pub fn record_flow_run(flow: &str, outcome: &'static str, duration: Duration) {
    counter!("flow_runs_total", "flow" => flow.to_string(), "outcome" => outcome).increment(1);
    histogram!("flow_run_duration_seconds", "flow" => flow.to_string())
        .record(duration.as_secs_f64());
}

/// Record one attempt of a step
pub fn record_step_attempt(params: StepAttemptMetricParams) {
    let labels = [
        ("flow", params.flow.to_string()),
        ("step", params.step.to_string()),
        ("outcome", params.outcome.to_string()),
    ];

    counter!("flow_step_attempts_total", &labels).increment(1);
}

/// Parameters for step attempt metrics
pub struct StepAttemptMetricParams<'a> {
    pub flow: &'a str,
    pub step: &'a str,
    pub outcome: &'static str,
}
