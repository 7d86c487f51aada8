//! In-memory flow repository implementation

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::flow::{
    parse_stored_flow, to_json, validate, FlowDefinition, FlowError, FlowId, FlowRepository,
    ValidatedFlow,
};

/// In-memory implementation of FlowRepository
///
/// Stores serialized documents so loads exercise the same parser as files.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFlowRepository {
    documents: Arc<RwLock<BTreeMap<FlowId, Vec<u8>>>>,
}

impl InMemoryFlowRepository {
    /// Create a new empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw document bytes without validation
    pub async fn insert_raw(&self, id: FlowId, bytes: impl Into<Vec<u8>>) {
        self.documents.write().await.insert(id, bytes.into());
    }
}

#[async_trait]
impl FlowRepository for InMemoryFlowRepository {
    async fn list(&self) -> Result<Vec<FlowId>, FlowError> {
        let documents = self.documents.read().await;
        Ok(documents.keys().cloned().collect())
    }

    async fn load(&self, id: &FlowId) -> Result<ValidatedFlow, FlowError> {
        let documents = self.documents.read().await;
        let bytes = documents
            .get(id)
            .ok_or_else(|| FlowError::not_found(id.as_str()))?;
        parse_stored_flow(id, bytes)
    }

    async fn save(&self, definition: &FlowDefinition) -> Result<(), FlowError> {
        let validated = validate(definition.clone())?;
        let json = to_json(&validated)?;

        let mut documents = self.documents.write().await;
        documents.insert(definition.id().clone(), json.into_bytes());
        Ok(())
    }

    async fn delete(&self, id: &FlowId) -> Result<bool, FlowError> {
        let mut documents = self.documents.write().await;
        Ok(documents.remove(id).is_some())
    }

    async fn exists(&self, id: &FlowId) -> Result<bool, FlowError> {
        let documents = self.documents.read().await;
        Ok(documents.contains_key(id))
    }
}
