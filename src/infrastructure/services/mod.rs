//! Infrastructure services

mod flow_service;

pub use flow_service::{FlowListing, FlowService, FlowSummary, ValidationReport};
