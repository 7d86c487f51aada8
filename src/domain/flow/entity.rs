//! Flow domain entity

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::document::{FlowDocument, StepDocument};
use super::error::FlowError;
use super::step_types::Step;

/// Schema tag written to and required from every flow document
pub const SCHEMA_VERSION: &str = "pmp-flow/v1";

/// Maximum length for flow IDs
pub const MAX_ID_LENGTH: usize = 64;

/// Regex pattern for valid flow IDs: alphanumeric, hyphens and underscores
static ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$").unwrap());

/// Validated flow identifier; doubles as the storage file stem
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlowId(String);

impl FlowId {
    /// Create a new validated flow ID
    pub fn new(id: impl Into<String>) -> Result<Self, FlowError> {
        let id = id.into();
        validate_flow_id(&id)?;
        Ok(Self(id))
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FlowId {
    type Error = FlowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FlowId> for String {
    fn from(id: FlowId) -> Self {
        id.0
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for FlowId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate a flow ID string
pub fn validate_flow_id(id: &str) -> Result<(), FlowError> {
    if id.is_empty() {
        return Err(FlowError::validation("Flow ID cannot be empty"));
    }

    if id.len() > MAX_ID_LENGTH {
        return Err(FlowError::validation(format!(
            "Flow ID exceeds maximum length of {} characters",
            MAX_ID_LENGTH
        )));
    }

    if !ID_PATTERN.is_match(id) {
        return Err(FlowError::validation(format!(
            concat!(
                "Invalid flow ID '{}': must start with an alphanumeric character ",
                "and contain only alphanumerics, hyphens and underscores"
            ),
            id
        )));
    }

    Ok(())
}

/// A flow definition: declared variables plus a graph of steps indexed by ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FlowDocument", into = "FlowDocument")]
pub struct FlowDefinition {
    schema: String,
    id: FlowId,
    name: String,
    description: String,
    variables: BTreeMap<String, String>,
    initial_step: String,
    steps: BTreeMap<String, Step>,
}

impl FlowDefinition {
    /// Create a new flow starting at `initial_step`
    pub fn new(id: FlowId, name: impl Into<String>, initial_step: impl Into<String>) -> Self {
        Self {
            schema: SCHEMA_VERSION.to_string(),
            id,
            name: name.into(),
            description: String::new(),
            variables: BTreeMap::new(),
            initial_step: initial_step.into(),
            steps: BTreeMap::new(),
        }
    }

    // Builder methods

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare a variable with its default value
    pub fn with_variable(mut self, name: impl Into<String>, default: impl Into<String>) -> Self {
        self.variables.insert(name.into(), default.into());
        self
    }

    pub fn with_step(mut self, id: impl Into<String>, step: Step) -> Self {
        self.steps.insert(id.into(), step);
        self
    }

    // Getters

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn id(&self) -> &FlowId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.keys().map(String::as_str).collect()
    }

    pub fn initial_step(&self) -> &str {
        &self.initial_step
    }

    pub fn steps(&self) -> &BTreeMap<String, Step> {
        &self.steps
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.get(id)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

impl TryFrom<FlowDocument> for FlowDefinition {
    type Error = FlowError;

    /// Document-level checks, in order: schema, ID, initial step, per-step fields
    fn try_from(document: FlowDocument) -> Result<Self, Self::Error> {
        if document.schema != SCHEMA_VERSION {
            return Err(FlowError::validation(format!(
                "Unsupported schema '{}' (expected '{}')",
                document.schema, SCHEMA_VERSION
            )));
        }

        let id = FlowId::new(document.id)?;

        if !document.steps.contains_key(&document.initial_step) {
            return Err(FlowError::validation(format!(
                "Initial step '{}' is not defined in steps",
                document.initial_step
            )));
        }

        let mut steps = BTreeMap::new();
        for (step_id, step) in document.steps {
            if step_id.is_empty() {
                return Err(FlowError::validation("Step IDs cannot be empty"));
            }
            let step = step.into_step(&step_id)?;
            steps.insert(step_id, step);
        }

        Ok(Self {
            schema: document.schema,
            id,
            name: document.name,
            description: document.description,
            variables: document.variables,
            initial_step: document.initial_step,
            steps,
        })
    }
}

impl From<FlowDefinition> for FlowDocument {
    fn from(definition: FlowDefinition) -> Self {
        Self {
            schema: definition.schema,
            id: definition.id.into(),
            name: definition.name,
            description: definition.description,
            variables: definition.variables,
            initial_step: definition.initial_step,
            steps: definition
                .steps
                .iter()
                .map(|(id, step)| (id.clone(), StepDocument::from(step)))
                .collect(),
        }
    }
}
