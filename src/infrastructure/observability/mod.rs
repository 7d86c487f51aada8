//! Observability infrastructure - Metrics

mod metrics;

pub use metrics::{
    attempt_outcome, record_flow_run, record_step_attempt, run_outcome, StepAttemptMetricParams,
};
