//! Parsing stored bytes into validated flows

use super::document::FlowDocument;
use super::entity::{FlowDefinition, FlowId};
use super::error::FlowError;
use super::validator::{validate, ValidatedFlow};

/// Parse and validate a flow document
pub fn parse_flow(bytes: &[u8]) -> Result<ValidatedFlow, FlowError> {
    let document: FlowDocument = serde_json::from_slice(bytes)
        .map_err(|e| FlowError::validation(format!("Malformed flow document: {}", e)))?;

    let definition = FlowDefinition::try_from(document)?;
    validate(definition)
}

/// Parse a flow stored under `expected`; the document ID must match
pub fn parse_stored_flow(expected: &FlowId, bytes: &[u8]) -> Result<ValidatedFlow, FlowError> {
    let flow = parse_flow(bytes)?;

    if flow.id() != expected {
        return Err(FlowError::validation(format!(
            "Flow document id '{}' does not match its storage id '{}'",
            flow.id(),
            expected
        )));
    }

    Ok(flow)
}

/// Serialize a definition as a pretty-printed document
pub fn to_json(definition: &FlowDefinition) -> Result<String, FlowError> {
    serde_json::to_string_pretty(definition)
        .map_err(|e| {
            FlowError::storage(format!("Failed to serialize flow '{}': {}", definition.id(), e))
        })
}
