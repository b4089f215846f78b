use crate::{NodeError, NodeId, RunId, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Outputs of every upstream node that has produced something so far,
/// keyed by producer node id.
pub type NodeInputs = HashMap<NodeId, HashMap<String, Value>>;

/// Core trait that all executable nodes implement.
///
/// Instances are created from a [`NodeConfig`](crate::NodeConfig) by a
/// factory at the start of each run and own their configuration. They
/// carry no state across runs.
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique type identifier (e.g., "http_request", "condition")
    fn node_type(&self) -> &str;

    /// Execute the node with given context.
    ///
    /// A logical failure (an HTTP 500, say) should be reported in the
    /// returned outputs. Returning `Err` fails the whole run.
    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError>;

    /// Check the node's own configuration. Pure, no I/O.
    fn validate_config(&self) -> Vec<ConfigFieldError> {
        Vec::new()
    }
}

/// One problem with a single config field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFieldError {
    pub field: String,
    pub error: String,
}

impl ConfigFieldError {
    pub fn new(field: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            error: error.into(),
        }
    }
}

/// Execution context passed to each node
#[derive(Clone)]
pub struct NodeContext {
    pub run_id: RunId,

    pub node_id: NodeId,

    /// 1 on the first execution of this node in the run, 2+ inside loops
    pub iteration: u32,

    /// Latest outputs of this node's direct predecessors
    pub inputs: NodeInputs,

    /// Caller-supplied initial state, shared by every node in the run
    pub initial: Arc<HashMap<String, Value>>,

    /// Cancellation token for graceful shutdown
    pub cancellation: tokio_util::sync::CancellationToken,
}

impl NodeContext {
    pub fn new(run_id: RunId, node_id: impl Into<NodeId>) -> Self {
        Self {
            run_id,
            node_id: node_id.into(),
            iteration: 1,
            inputs: HashMap::new(),
            initial: Arc::new(HashMap::new()),
            cancellation: tokio_util::sync::CancellationToken::new(),
        }
    }

    pub fn with_input(mut self, from: impl Into<NodeId>, outputs: HashMap<String, Value>) -> Self {
        self.inputs.insert(from.into(), outputs);
        self
    }

    pub fn with_initial(mut self, initial: HashMap<String, Value>) -> Self {
        self.initial = Arc::new(initial);
        self
    }

    /// Get the outputs of a required predecessor or return error
    pub fn require_input(&self, from: &str) -> Result<&HashMap<String, Value>, NodeError> {
        self.inputs
            .get(from)
            .ok_or_else(|| NodeError::MissingInput(from.to_string()))
    }

    /// First upstream value published under `key`, scanning producers in id order.
    pub fn find_input(&self, key: &str) -> Option<&Value> {
        let mut producers: Vec<&NodeId> = self.inputs.keys().collect();
        producers.sort();
        producers
            .into_iter()
            .find_map(|producer| self.inputs.get(producer).and_then(|outputs| outputs.get(key)))
    }

    /// Like [`find_input`](Self::find_input) but an absent key is an error.
    pub fn require_value(&self, key: &str) -> Result<&Value, NodeError> {
        self.find_input(key)
            .ok_or_else(|| NodeError::MissingInput(key.to_string()))
    }

    /// All upstream outputs flattened into one object keyed by producer id.
    pub fn merged_inputs(&self) -> Value {
        Value::Object(
            self.inputs
                .iter()
                .map(|(producer, outputs)| (producer.clone(), Value::Object(outputs.clone())))
                .collect(),
        )
    }
}

/// Output from node execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOutput {
    /// Output values by key
    pub outputs: HashMap<String, Value>,

    /// Execution metadata
    pub metadata: NodeMetadata,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self {
            outputs: HashMap::new(),
            metadata: NodeMetadata::default(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    /// Boolean `result` output, the verdict a `condition` node produces.
    pub fn verdict(&self) -> Option<bool> {
        self.outputs.get("result").and_then(Value::as_bool)
    }
}

impl Default for NodeOutput {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata about node execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub execution_time_ms: u64,
    pub custom: HashMap<String, Value>,
}
