//! Flow error taxonomy

use thiserror::Error;

/// Errors that can occur while loading, validating or running a flow
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FlowError {
    /// Malformed or structurally invalid definition; fatal at load, never retried
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cycle detected: step '{from}' leads back to '{to}'")]
    CycleDetected { from: String, to: String },

    #[error("Evaluation failed in step '{step}': {message}")]
    Evaluation { step: String, message: String },

    #[error("Missing variable: {0}")]
    MissingVariable(String),

    #[error("Provider error in step '{step}': {message}")]
    Provider { step: String, message: String },

    #[error("Timeout in step '{step}' after {timeout_ms}ms")]
    Timeout { step: String, timeout_ms: u64 },

    #[error("Tool resolution failed in step '{step}': {message}")]
    ToolResolution { step: String, message: String },

    #[error("Step '{step}' failed after {attempts} attempt(s): {cause}")]
    TerminalExecution {
        step: String,
        attempts: u32,
        cause: Box<FlowError>,
    },

    #[error("Run cancelled in step '{0}'")]
    Cancelled(String),

    #[error("Flow not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl FlowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn cycle_detected(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::CycleDetected {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn evaluation(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluation {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn missing_variable(name: impl Into<String>) -> Self {
        Self::MissingVariable(name.into())
    }

    pub fn provider(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn timeout(step: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            step: step.into(),
            timeout_ms,
        }
    }

    pub fn tool_resolution(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolResolution {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn terminal(step: impl Into<String>, attempts: u32, cause: FlowError) -> Self {
        Self::TerminalExecution {
            step: step.into(),
            attempts,
            cause: Box::new(cause),
        }
    }

    pub fn cancelled(step: impl Into<String>) -> Self {
        Self::Cancelled(step.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Errors subject to a step's retry policy
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Timeout { .. })
    }

    /// Load-time rejections of a definition (a cycle is a structural defect too)
    pub fn is_validation_failure(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::CycleDetected { .. })
    }
}
