//! Core abstractions for the loom workflow engine
//!
//! This crate provides the workflow graph data model, the node capability
//! trait, validation findings and run lifecycle events. It contains no
//! graph algorithms and no scheduler; those live in `loomruntime`.

mod error;
pub mod events;
mod node;
mod validation;
mod value;
mod workflow;

pub use error::{FlowError, NodeError, WorkflowError};
pub use events::*;
pub use node::{ConfigFieldError, Node, NodeContext, NodeInputs, NodeMetadata, NodeOutput};
pub use validation::{
    ValidationCode, ValidationError, ValidationIssue, ValidationResult, ValidationWarning,
};
pub use value::Value;
pub use workflow::{
    EdgeDefinition, EdgeSpec, NodeConfig, NodeId, NodeSpec, WorkflowBuilder, WorkflowDefinition,
    WorkflowSpec, DEFAULT_MAX_ITERATIONS,
};

/// Node type whose boolean verdict drives branching and loop exits.
pub const CONDITION_NODE_TYPE: &str = "condition";

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
