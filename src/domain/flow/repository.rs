//! Flow repository trait

use async_trait::async_trait;

use super::entity::{FlowDefinition, FlowId};
use super::error::FlowError;
use super::validator::ValidatedFlow;

/// Storage adapter for flow definitions
#[async_trait]
pub trait FlowRepository: Send + Sync + std::fmt::Debug {
    /// List stored flow IDs without parsing the documents
    async fn list(&self) -> Result<Vec<FlowId>, FlowError>;

    /// Load and validate a flow
    async fn load(&self, id: &FlowId) -> Result<ValidatedFlow, FlowError>;

    /// Validate and persist a flow, replacing any previous version
    async fn save(&self, definition: &FlowDefinition) -> Result<(), FlowError>;

    /// Delete a flow by ID
    async fn delete(&self, id: &FlowId) -> Result<bool, FlowError>;

    /// Check if a flow exists
    async fn exists(&self, id: &FlowId) -> Result<bool, FlowError>;
}
