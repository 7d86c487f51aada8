//! Flow infrastructure - Execution engine and storage adapters

mod engine;
mod file_repository;
mod in_memory_repository;

pub use engine::{FlowEngine, FlowEngineConfig};
pub use file_repository::FileFlowRepository;
pub use in_memory_repository::InMemoryFlowRepository;
