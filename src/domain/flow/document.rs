//! On-disk flow document
//!
//! The stored shape is deliberately loose (every step field optional) so that
//! type/field mismatches are reported as validation errors naming the step,
//! rather than as opaque parse failures.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::entity::SCHEMA_VERSION;
use super::error::FlowError;
use super::step_types::{ConditionEntry, ConditionStep, PromptStep, RetryPolicy, Step};

fn default_schema() -> String {
    SCHEMA_VERSION.to_string()
}

/// A flow document exactly as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDocument {
    #[serde(default = "default_schema")]
    pub schema: String,

    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Declared variables and their default values
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    pub initial_step: String,

    #[serde(default)]
    pub steps: BTreeMap<String, StepDocument>,
}

/// A step document; `type` selects which fields are allowed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDocument {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_server: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub include_history: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionEntry>,
}

impl StepDocument {
    /// Names of prompt-only fields present on this document
    fn prompt_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();

        if self.prompt.is_some() {
            fields.push("prompt");
        }
        if self.system_prompt.is_some() {
            fields.push("systemPrompt");
        }
        if !self.context.is_empty() {
            fields.push("context");
        }
        if self.model.is_some() {
            fields.push("model");
        }
        if !self.tools.is_empty() {
            fields.push("tools");
        }
        if self.mcp_server.is_some() {
            fields.push("mcpServer");
        }
        if self.include_history {
            fields.push("includeHistory");
        }
        if self.next.is_some() {
            fields.push("next");
        }
        if self.retry.is_some() {
            fields.push("retry");
        }
        if self.timeout_ms.is_some() {
            fields.push("timeoutMs");
        }

        fields
    }

    /// Convert into a typed step, rejecting fields that do not belong to its type
    pub fn into_step(self, step_id: &str) -> Result<Step, FlowError> {
        let step = match self.kind.as_str() {
            "prompt" => {
                if !self.conditions.is_empty() {
                    return Err(FlowError::validation(format!(
                        "Prompt step '{}' must not declare 'conditions'",
                        step_id
                    )));
                }

                let prompt = self.prompt.ok_or_else(|| {
                    FlowError::validation(format!(
                        "Prompt step '{}' is missing required field 'prompt'",
                        step_id
                    ))
                })?;
                let next = self.next.ok_or_else(|| {
                    FlowError::validation(format!(
                        "Prompt step '{}' is missing required field 'next'",
                        step_id
                    ))
                })?;

                Step::Prompt(PromptStep {
                    prompt,
                    system_prompt: self.system_prompt,
                    context: self.context,
                    model: self.model,
                    tools: self.tools,
                    mcp_server: self.mcp_server,
                    include_history: self.include_history,
                    next,
                    retry: self.retry.unwrap_or_default(),
                    timeout_ms: self.timeout_ms,
                })
            }
            "condition" => {
                if let Some(field) = self.prompt_fields().first() {
                    return Err(FlowError::validation(format!(
                        "Condition step '{}' must not declare '{}'",
                        step_id, field
                    )));
                }

                Step::Condition(ConditionStep::new(self.conditions))
            }
            "end" => {
                let extra = self
                    .prompt_fields()
                    .first()
                    .copied()
                    .or((!self.conditions.is_empty()).then_some("conditions"));

                if let Some(field) = extra {
                    return Err(FlowError::validation(format!(
                        "End step '{}' must not declare '{}'",
                        step_id, field
                    )));
                }

                Step::End
            }
            other => {
                return Err(FlowError::validation(format!(
                    "Step '{}' has unknown type '{}' (expected prompt, condition or end)",
                    step_id, other
                )));
            }
        };

        step.validate(step_id)?;
        Ok(step)
    }
}

impl From<&Step> for StepDocument {
    fn from(step: &Step) -> Self {
        match step {
            Step::Prompt(prompt) => Self {
                kind: step.type_name().to_string(),
                prompt: Some(prompt.prompt.clone()),
                system_prompt: prompt.system_prompt.clone(),
                context: prompt.context.clone(),
                model: prompt.model.clone(),
                tools: prompt.tools.clone(),
                mcp_server: prompt.mcp_server.clone(),
                include_history: prompt.include_history,
                next: Some(prompt.next.clone()),
                retry: (!prompt.retry.is_default()).then_some(prompt.retry),
                timeout_ms: prompt.timeout_ms,
                conditions: Vec::new(),
            },
            Step::Condition(condition) => Self {
                kind: step.type_name().to_string(),
                conditions: condition.conditions.clone(),
                ..Self::default()
            },
            Step::End => Self {
                kind: step.type_name().to_string(),
                ..Self::default()
            },
        }
    }
}
