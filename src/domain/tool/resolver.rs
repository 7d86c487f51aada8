//! Tool resolution trait

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::ToolDefinition;
use crate::domain::DomainError;

/// Resolves tool names exposed by a tool (MCP) server into callable signatures.
///
/// Implementations own the transport to the server; callers only ever see the
/// resolved definitions. `NotFound`/`Validation` errors mean the server or a
/// tool does not exist; `Provider` errors are transport failures.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ToolResolver: Send + Sync {
    async fn resolve(
        &self,
        server: &str,
        tools: &[String],
    ) -> Result<Vec<ToolDefinition>, DomainError>;
}
