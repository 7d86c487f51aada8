//! Domain layer - Core flow model, collaborator traits and errors

pub mod error;
pub mod flow;
pub mod llm;
pub mod tool;

pub use error::DomainError;
pub use flow::{
    FlowDefinition, FlowError, FlowId, FlowRepository, FlowRun, FlowState, RunState, Step,
    SubstitutionPolicy, ValidatedFlow,
};
pub use llm::{FinishReason, LlmProvider, LlmRequest, LlmResponse, Message, MessageRole, Usage};
pub use tool::{ToolDefinition, ToolResolver};
