//! Infrastructure layer - Engine, storage adapters and external service implementations

pub mod flow;
pub mod llm;
pub mod logging;
pub mod observability;
pub mod services;
pub mod tool;
