//! Flow service - Listing, inspection, import and execution of stored flows

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::flow::{parse_flow, FlowError, FlowId, FlowRepository, FlowRun, ValidatedFlow};
use crate::infrastructure::flow::FlowEngine;

/// Catalogue view of a stored flow
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSummary {
    pub id: FlowId,
    pub name: String,
    pub description: String,
    pub step_count: usize,
    pub variables: Vec<String>,
}

impl FlowSummary {
    fn from_flow(flow: &ValidatedFlow) -> Self {
        Self {
            id: flow.id().clone(),
            name: flow.name().to_string(),
            description: flow.description().to_string(),
            step_count: flow.step_count(),
            variables: flow
                .variable_names()
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// One row of a detailed listing; a corrupt flow does not abort the listing
#[derive(Debug, Clone, PartialEq)]
pub enum FlowListing {
    Loaded(FlowSummary),
    Failed { id: FlowId, error: FlowError },
}

impl FlowListing {
    pub fn id(&self) -> &FlowId {
        match self {
            Self::Loaded(summary) => &summary.id,
            Self::Failed { id, .. } => id,
        }
    }
}

/// Outcome of validating one requested flow
#[derive(Debug)]
pub struct ValidationReport {
    pub id: String,
    pub result: Result<ValidatedFlow, FlowError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.result.is_ok()
    }
}

/// Flow service over a repository
#[derive(Debug, Clone)]
pub struct FlowService {
    repository: Arc<dyn FlowRepository>,
}

impl FlowService {
    pub fn new(repository: Arc<dyn FlowRepository>) -> Self {
        Self { repository }
    }

    /// Stored flow IDs, without parsing any document
    pub async fn list(&self) -> Result<Vec<FlowId>, FlowError> {
        self.repository.list().await
    }

    /// Load every stored flow, reporting failures per flow
    pub async fn list_detailed(&self) -> Result<Vec<FlowListing>, FlowError> {
        let ids = self.repository.list().await?;
        let mut listings = Vec::with_capacity(ids.len());

        for id in ids {
            match self.repository.load(&id).await {
                Ok(flow) => listings.push(FlowListing::Loaded(FlowSummary::from_flow(&flow))),
                Err(error) => {
                    warn!(flow = %id, error = %error, "Failed to load flow");
                    listings.push(FlowListing::Failed { id, error });
                }
            }
        }

        Ok(listings)
    }

    /// Load a flow by its textual ID
    pub async fn get(&self, id: &str) -> Result<ValidatedFlow, FlowError> {
        let flow_id = FlowId::new(id)?;
        self.repository.load(&flow_id).await
    }

    /// Validate the named flows, or every stored flow when `ids` is empty
    pub async fn validate(&self, ids: &[String]) -> Result<Vec<ValidationReport>, FlowError> {
        let ids: Vec<String> = if ids.is_empty() {
            self.repository
                .list()
                .await?
                .into_iter()
                .map(String::from)
                .collect()
        } else {
            ids.to_vec()
        };

        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            let result = self.get(&id).await;
            reports.push(ValidationReport { id, result });
        }

        Ok(reports)
    }

    /// Validate a raw document and store it under its own ID
    pub async fn import(&self, bytes: &[u8], replace: bool) -> Result<ValidatedFlow, FlowError> {
        let flow = parse_flow(bytes)?;

        if !replace && self.repository.exists(flow.id()).await? {
            return Err(FlowError::validation(format!(
                "Flow '{}' already exists",
                flow.id()
            )));
        }

        self.repository.save(flow.definition()).await?;
        info!(flow = %flow.id(), steps = flow.step_count(), "Flow imported");

        Ok(flow)
    }

    /// Load and execute a stored flow
    pub async fn run(
        &self,
        engine: &FlowEngine,
        id: &str,
        inputs: BTreeMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<FlowRun, FlowError> {
        let flow = self.get(id).await?;
        engine.run(&flow, inputs, cancel).await
    }
}
