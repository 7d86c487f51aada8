//! Flow domain module
//!
//! A flow is a JSON-described directed graph of steps:
//! - `prompt` steps substitute templates and ask a completion provider
//! - `condition` steps branch on boolean expressions over the run state
//! - `end` steps terminate the run
//!
//! ## Variable References
//!
//! Templates reference the run state with:
//! - `${name}` - A declared variable or step-local context binding
//! - `${step-id.content}` - A field of a previous step's output
//! - `${path:default}` - With default value

mod context;
mod document;
mod entity;
mod error;
mod expression;
pub mod loader;
pub mod repository;
mod run;
mod step_types;
mod validator;

pub use context::{FlowState, Lookup, Scope, SubstitutionPolicy, Substitutor, VariableRef};
pub use document::{FlowDocument, StepDocument};
pub use entity::{validate_flow_id, FlowDefinition, FlowId, MAX_ID_LENGTH, SCHEMA_VERSION};
pub use error::FlowError;
pub use expression::{CompareOp, Expression, ExpressionError, MAX_NESTING};
pub use loader::{parse_flow, parse_stored_flow, to_json};
pub use repository::FlowRepository;
pub use run::{FlowRun, RunState, StepRecord};
pub use step_types::{
    Branch, ConditionEntry, ConditionStep, PromptStep, RetryPolicy, Step, Transition,
};
pub use validator::{validate, ValidatedFlow};
