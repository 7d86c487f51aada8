//! Tool server collaborators
//!
//! A Prompt step may name tools on a tool server; the engine only consumes
//! the resolved signatures, never the server transport.

mod definition;
mod resolver;

pub use definition::ToolDefinition;
pub use resolver::ToolResolver;

#[cfg(test)]
pub use resolver::MockToolResolver;
