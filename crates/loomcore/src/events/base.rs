use crate::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type RunId = Uuid;

/// Lifecycle events of one workflow run.
///
/// For a given run they are emitted in a total order: one `WorkflowStart`,
/// any number of `LoopIteration`, at most one `LoopTerminated`, then one
/// `WorkflowComplete`. Failed and cancelled runs stop the stream without a
/// `WorkflowComplete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    WorkflowStart {
        workflow_name: String,
        entry_point: NodeId,
        node_count: usize,
        has_loops: bool,
        max_iterations: u32,
        timestamp: DateTime<Utc>,
    },
    LoopIteration {
        node_id: NodeId,
        iteration: u32,
        timestamp: DateTime<Utc>,
    },
    LoopTerminated {
        node_id: NodeId,
        count: u32,
        max_iterations: u32,
        timestamp: DateTime<Utc>,
    },
    WorkflowComplete {
        success: bool,
        loop_terminated: bool,
        node_execution_counts: BTreeMap<NodeId, u32>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    /// Wire name of the event kind.
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionEvent::WorkflowStart { .. } => "workflow_start",
            ExecutionEvent::LoopIteration { .. } => "loop_iteration",
            ExecutionEvent::LoopTerminated { .. } => "loop_terminated",
            ExecutionEvent::WorkflowComplete { .. } => "workflow_complete",
        }
    }

    /// Event fields as a JSON object, without the kind tag.
    pub fn payload(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.remove("type");
                serde_json::Value::Object(map)
            }
            _ => serde_json::Value::Null,
        }
    }
}

/// An event tagged with the run that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: RunId,
    pub event: ExecutionEvent,
}
