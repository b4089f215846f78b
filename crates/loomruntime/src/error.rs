use loomcore::{NodeError, NodeId, ValidationResult};
use thiserror::Error;

/// Failures of graph analysis and plan building.
#[derive(Error, Debug, Clone)]
pub enum GraphError {
    /// Carries the complete result so callers can inspect every finding.
    #[error("workflow validation failed: {0}")]
    ValidationFailed(ValidationResult),

    #[error("graph contains uncontrolled cycles through: {}", nodes.join(", "))]
    UncontrolledCycle { nodes: Vec<NodeId> },
}

impl GraphError {
    pub fn validation(&self) -> Option<&ValidationResult> {
        match self {
            GraphError::ValidationFailed(result) => Some(result),
            _ => None,
        }
    }
}

/// Unrecoverable problems inside a run. These end the run as `failed`.
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("failed to instantiate node '{node_id}': {message}")]
    Instantiate { node_id: NodeId, message: String },

    #[error("node '{node_id}' failed: {source}")]
    Node { node_id: NodeId, source: NodeError },

    #[error("condition node '{0}' did not produce a boolean 'result'")]
    MissingVerdict(NodeId),

    #[error("condition on edge '{edge_id}' could not be evaluated: {source}")]
    Condition { edge_id: String, source: NodeError },

    #[error("internal error: {0}")]
    Internal(String),
}
