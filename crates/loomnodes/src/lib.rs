//! Standard node library
//!
//! Built-in node kinds for seeding, transforming, branching on and
//! collecting workflow data.

mod condition;
mod data;
mod http;
mod output;
mod time;

pub use condition::{ConditionNode, ConditionNodeFactory, Operator};
pub use data::{
    DataProcessorNode, DataProcessorNodeFactory, DataSourceNode, DataSourceNodeFactory, Operation,
};
pub use http::{HttpRequestNode, HttpRequestNodeFactory};
pub use output::{OutputNode, OutputNodeFactory};
pub use time::{DelayNode, DelayNodeFactory};

use loomcore::{NodeContext, Value, WorkflowError};
use loomruntime::NodeRegistry;
use std::sync::Arc;

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) -> Result<(), WorkflowError> {
    registry.register(Arc::new(DataSourceNodeFactory))?;
    registry.register(Arc::new(DataProcessorNodeFactory))?;
    registry.register(Arc::new(HttpRequestNodeFactory))?;
    registry.register(Arc::new(ConditionNodeFactory))?;
    registry.register(Arc::new(OutputNodeFactory))?;
    registry.register(Arc::new(DelayNodeFactory))?;
    Ok(())
}

/// A fresh registry holding every standard node.
pub fn standard_registry() -> Result<NodeRegistry, WorkflowError> {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry)?;
    Ok(registry)
}

/// Upstream value under `key`, taken from `preferred` when that producer
/// has published it.
pub(crate) fn upstream_value<'a>(
    ctx: &'a NodeContext,
    key: &str,
    preferred: Option<&str>,
) -> Option<&'a Value> {
    preferred
        .and_then(|producer| ctx.inputs.get(producer))
        .and_then(|outputs| outputs.get(key))
        .or_else(|| ctx.find_input(key))
}
