use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by a node while it executes, or by its factory.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,
}

/// Structural errors. These fail fast when a graph or a node type is
/// constructed and are never downgraded to validation findings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("node id must not be empty")]
    EmptyNodeId,

    #[error("node '{node_id}' has an empty type")]
    EmptyNodeType { node_id: String },

    #[error("edge id must not be empty")]
    EmptyEdgeId,

    #[error("edge '{edge_id}' is a self-loop on node '{node_id}'")]
    SelfLoop { edge_id: String, node_id: String },

    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("duplicate edge id: {0}")]
    DuplicateEdgeId(String),

    #[error("edge '{edge_id}' references unknown node '{node_id}'")]
    UnknownEdgeEndpoint { edge_id: String, node_id: String },

    #[error("workflow has no nodes")]
    EmptyWorkflow,

    #[error("entry point is ambiguous, candidates: {}", candidates.join(", "))]
    AmbiguousEntryPoint { candidates: Vec<String> },

    #[error("entry point '{0}' is not a declared node")]
    EntryPointNotFound(String),

    #[error("max_iterations must be at least 1, got {0}")]
    InvalidMaxIterations(u32),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("invalid node definition: {0}")]
    InvalidNodeDefinition(String),

    #[error("a global node registry is already installed")]
    RegistryAlreadyInstalled,
}
