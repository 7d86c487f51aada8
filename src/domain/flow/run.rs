//! Run records produced by the execution engine

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::context::FlowState;
use super::entity::FlowId;

/// Execution state machine
///
/// `Idle -> Running(step) -> {Running(next) | AwaitingRetry | Failed | Completed}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RunState {
    Idle,
    Running { step: String },
    AwaitingRetry { step: String, attempt: u32 },
    Failed { step: String, cause: String },
    Completed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }
}

/// Outcome of one executed step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step_id: String,
    pub kind: &'static str,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    pub elapsed_ms: u64,
}

/// A completed run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRun {
    run_id: Uuid,
    flow_id: FlowId,
    started_at: DateTime<Utc>,
    elapsed_ms: u64,
    state: FlowState,
    steps: Vec<StepRecord>,
    transitions: Vec<RunState>,
}

impl FlowRun {
    pub(crate) fn new(
        run_id: Uuid,
        flow_id: FlowId,
        started_at: DateTime<Utc>,
        elapsed_ms: u64,
        state: FlowState,
        steps: Vec<StepRecord>,
        transitions: Vec<RunState>,
    ) -> Self {
        Self {
            run_id,
            flow_id,
            started_at,
            elapsed_ms,
            state,
            steps,
            transitions,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn flow_id(&self) -> &FlowId {
        &self.flow_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Final accumulated state: declared variables plus every step's output
    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Every state the machine passed through, `Idle` first
    pub fn transitions(&self) -> &[RunState] {
        &self.transitions
    }

    /// Step IDs in execution order
    pub fn path(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.step_id.as_str()).collect()
    }

    pub fn step(&self, step_id: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn is_completed(&self) -> bool {
        self.transitions.last() == Some(&RunState::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_serialization() {
        let json = serde_json::to_value(RunState::AwaitingRetry {
            step: "ask".to_string(),
            attempt: 2,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"state": "awaitingRetry", "step": "ask", "attempt": 2})
        );

        assert!(RunState::Completed.is_terminal());
        assert!(!RunState::Idle.is_terminal());
    }

    #[test]
    fn test_run_accessors() {
        let run = FlowRun::new(
            Uuid::new_v4(),
            FlowId::new("greet").unwrap(),
            Utc::now(),
            12,
            FlowState::default(),
            vec![
                StepRecord {
                    step_id: "ask".to_string(),
                    kind: "prompt",
                    attempts: 1,
                    output: None,
                    next: Some("done".to_string()),
                    elapsed_ms: 10,
                },
                StepRecord {
                    step_id: "done".to_string(),
                    kind: "end",
                    attempts: 1,
                    output: None,
                    next: None,
                    elapsed_ms: 0,
                },
            ],
            vec![
                RunState::Idle,
                RunState::Running {
                    step: "ask".to_string(),
                },
                RunState::Running {
                    step: "done".to_string(),
                },
                RunState::Completed,
            ],
        );

        assert_eq!(run.path(), vec!["ask", "done"]);
        assert_eq!(run.step("ask").map(|s| s.attempts), Some(1));
        assert!(run.is_completed());
        assert_eq!(run.flow_id().as_str(), "greet");
    }
}
