//! PMP Flow
//!
//! Declarative multi-step LLM workflows:
//! - JSON flow documents validated at load (references, cycles, End reachability)
//! - Prompt, Condition and End steps with `${}` variable substitution
//! - Per-step retry, timeout and caller cancellation
//! - File-backed storage with atomic saves

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{FlowDefinition, FlowError, FlowId, FlowRun, ValidatedFlow};
pub use infrastructure::flow::{FileFlowRepository, FlowEngine, FlowEngineConfig};
