//! Tool resolver backed by tool signatures declared in configuration

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tracing::debug;

use crate::config::McpServerConfig;
use crate::domain::{DomainError, ToolDefinition, ToolResolver};

/// Resolves tools from a fixed table of server name to tool signatures
#[derive(Debug, Clone, Default)]
pub struct StaticToolResolver {
    servers: HashMap<String, Vec<ToolDefinition>>,
}

impl StaticToolResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(servers: &BTreeMap<String, McpServerConfig>) -> Self {
        servers
            .iter()
            .fold(Self::new(), |resolver, (name, server)| {
                resolver.with_server(name.clone(), server.tools.clone())
            })
    }

    pub fn with_server(mut self, name: impl Into<String>, tools: Vec<ToolDefinition>) -> Self {
        self.servers.insert(name.into(), tools);
        self
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }
}

#[async_trait]
impl ToolResolver for StaticToolResolver {
    async fn resolve(
        &self,
        server: &str,
        tools: &[String],
    ) -> Result<Vec<ToolDefinition>, DomainError> {
        let available = self.servers.get(server).ok_or_else(|| {
            DomainError::not_found(format!("Tool server '{}' is not configured", server))
        })?;

        let resolved = tools
            .iter()
            .map(|name| {
                available
                    .iter()
                    .find(|tool| &tool.name == name)
                    .cloned()
                    .ok_or_else(|| {
                        DomainError::not_found(format!(
                            "Tool '{}' not found on server '{}'",
                            name, server
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(server = %server, count = resolved.len(), "Resolved tools");
        Ok(resolved)
    }
}
