//! Flow step type definitions

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::context::Lookup;
use super::error::FlowError;
use super::expression::Expression;

/// A node in the flow graph
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Substitutes a template and asks the completion provider
    Prompt(PromptStep),

    /// Branches on boolean expressions over the run state
    Condition(ConditionStep),

    /// Terminal step
    End,
}

/// Where control goes after a step executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Next(String),
    Terminal,
}

impl Step {
    /// Get a human-readable type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Prompt(_) => "prompt",
            Self::Condition(_) => "condition",
            Self::End => "end",
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Outgoing edges in declaration order, duplicates removed
    pub fn successors(&self) -> Vec<&str> {
        match self {
            Self::Prompt(prompt) => vec![prompt.next.as_str()],
            Self::Condition(condition) => condition.targets(),
            Self::End => Vec::new(),
        }
    }

    /// Static checks that only need the step's own fields
    pub fn validate(&self, step_id: &str) -> Result<(), FlowError> {
        match self {
            Self::Prompt(prompt) => prompt.validate(step_id),
            Self::Condition(condition) => condition.validate(step_id),
            Self::End => Ok(()),
        }
    }
}

/// Per-step retry policy for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds
    #[serde(default)]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: 0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff_ms,
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Prompt step configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PromptStep {
    /// User message template
    pub prompt: String,

    /// Optional system message template
    pub system_prompt: Option<String>,

    /// Step-local bindings (name -> template), visible to this step's templates only
    pub context: BTreeMap<String, String>,

    /// Model identifier; falls back to the engine default
    pub model: Option<String>,

    /// Tool names to resolve against `mcp_server`
    pub tools: Vec<String>,

    /// Tool server reference
    pub mcp_server: Option<String>,

    /// Send the run's previous turns along with this prompt
    pub include_history: bool,

    pub next: String,

    pub retry: RetryPolicy,

    /// Bound on the external call per attempt, in milliseconds
    pub timeout_ms: Option<u64>,
}

impl PromptStep {
    pub fn new(prompt: impl Into<String>, next: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            next: next.into(),
            ..Self::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_context(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.context.insert(name.into(), template.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_tools(mut self, server: impl Into<String>, tools: Vec<String>) -> Self {
        self.mcp_server = Some(server.into());
        self.tools = tools;
        self
    }

    pub fn with_history(mut self, include_history: bool) -> Self {
        self.include_history = include_history;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff_ms: u64) -> Self {
        self.retry = RetryPolicy::new(max_attempts, backoff_ms);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    fn validate(&self, step_id: &str) -> Result<(), FlowError> {
        if self.prompt.trim().is_empty() {
            return Err(FlowError::validation(format!(
                "Prompt step '{}' requires a non-empty 'prompt'",
                step_id
            )));
        }

        if self.next.is_empty() {
            return Err(FlowError::validation(format!(
                "Prompt step '{}' requires 'next'",
                step_id
            )));
        }

        if !self.tools.is_empty() && self.mcp_server.is_none() {
            return Err(FlowError::validation(format!(
                "Prompt step '{}' lists tools but no 'mcpServer'",
                step_id
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(FlowError::validation(format!(
                "Prompt step '{}': retry.maxAttempts must be at least 1",
                step_id
            )));
        }

        if self.timeout_ms == Some(0) {
            return Err(FlowError::validation(format!(
                "Prompt step '{}': timeoutMs must be greater than 0",
                step_id
            )));
        }

        Ok(())
    }
}

/// One branch of a condition step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionEntry {
    /// Boolean predicate over the run state
    pub expression: String,

    /// Target when the expression is true
    pub on_true: String,

    /// Fallback target when no entry matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_false: Option<String>,
}

impl ConditionEntry {
    pub fn new(expression: impl Into<String>, on_true: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            on_true: on_true.into(),
            on_false: None,
        }
    }

    pub fn with_on_false(mut self, on_false: impl Into<String>) -> Self {
        self.on_false = Some(on_false.into());
        self
    }
}

/// Result of evaluating a condition step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    /// Expression that matched; `None` when the fallback was taken
    pub matched: Option<String>,
    pub target: String,
}

/// Condition step configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionStep {
    pub conditions: Vec<ConditionEntry>,
}

impl ConditionStep {
    pub fn new(conditions: Vec<ConditionEntry>) -> Self {
        Self { conditions }
    }

    pub fn add_condition(mut self, entry: ConditionEntry) -> Self {
        self.conditions.push(entry);
        self
    }

    /// The first declared `on_false` target, taken when nothing matches
    pub fn fallback(&self) -> Option<&str> {
        self.conditions.iter().find_map(|c| c.on_false.as_deref())
    }

    fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::new();

        for entry in &self.conditions {
            for target in std::iter::once(entry.on_true.as_str()).chain(entry.on_false.as_deref())
            {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }

        targets
    }

    /// Evaluate entries in declared order; first true wins, then the fallback
    pub fn select(&self, step_id: &str, state: &dyn Lookup) -> Result<Branch, FlowError> {
        for entry in &self.conditions {
            let expression = Expression::parse(&entry.expression)
                .map_err(|e| FlowError::evaluation(step_id, e.to_string()))?;

            let matched = expression
                .evaluate_bool(state)
                .map_err(|e| FlowError::evaluation(step_id, e.to_string()))?;

            if matched {
                return Ok(Branch {
                    matched: Some(entry.expression.clone()),
                    target: entry.on_true.clone(),
                });
            }
        }

        match self.fallback() {
            Some(target) => Ok(Branch {
                matched: None,
                target: target.to_string(),
            }),
            None => Err(FlowError::evaluation(
                step_id,
                "no condition evaluated to true and no 'onFalse' target is declared",
            )),
        }
    }

    fn validate(&self, step_id: &str) -> Result<(), FlowError> {
        if self.conditions.is_empty() {
            return Err(FlowError::validation(format!(
                "Condition step '{}' requires at least one condition entry",
                step_id
            )));
        }

        for (index, entry) in self.conditions.iter().enumerate() {
            if entry.on_true.is_empty() {
                return Err(FlowError::validation(format!(
                    "Condition step '{}' entry {} requires 'onTrue'",
                    step_id, index
                )));
            }

            Expression::parse(&entry.expression).map_err(|e| {
                FlowError::validation(format!(
                    "Condition step '{}' entry {} has an invalid expression: {}",
                    step_id, index, e
                ))
            })?;
        }

        Ok(())
    }
}
