//! Workflow execution runtime
//!
//! This crate provides the node registry, the graph validator and plan
//! builder, and the execution engine that runs plans with bounded loops.

mod condition;
mod error;
mod executor;
pub mod graph;
mod registry;
mod runtime;

pub use condition::{ConditionEvaluator, ConditionState, VerdictEvaluator};
pub use error::{ExecutionError, GraphError};
pub use executor::{
    ExecutionResult, ExecutorConfig, MaxIterationsExceeded, RunStatus, WorkflowExecutor,
};
pub use graph::{
    detect_cycle, detect_loops, find_dangling_nodes, find_terminal_nodes, get_execution_order,
    topological_sort, validate, ExecutablePlan, GraphBuilder, LoopInfo,
};
pub use registry::{FnNodeFactory, NodeDefinition, NodeFactory, NodeRegistry};
pub use runtime::{ExecutionHandle, FlowRuntime, RuntimeConfig};
