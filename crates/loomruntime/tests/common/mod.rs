#![allow(dead_code)]

use async_trait::async_trait;
use loomcore::{
    ConfigFieldError, EventSink, ExecutionEvent, FnSink, Node, NodeConfig, NodeContext, NodeError,
    NodeOutput, RunId, Value,
};
use loomruntime::{NodeDefinition, NodeRegistry};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Emits its id and the iteration it is on.
pub struct EchoNode {
    id: String,
    required: Vec<String>,
    config: NodeConfig,
}

#[async_trait]
impl Node for EchoNode {
    fn node_type(&self) -> &str {
        self.config.node_type()
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::new()
            .with_output("data", self.id.clone())
            .with_output("iteration", ctx.iteration as f64)
            .with_output("upstream", ctx.inputs.len() as f64))
    }

    fn validate_config(&self) -> Vec<ConfigFieldError> {
        self.required
            .iter()
            .filter(|field| self.config.get(field).is_none())
            .map(|field| ConfigFieldError::new(field.clone(), "is required"))
            .collect()
    }
}

/// Verdict comes from config `verdict` (default false), or flips to true
/// once `exit_after` iterations have run.
pub struct FixedCondition {
    verdict: bool,
    exit_after: Option<u32>,
}

#[async_trait]
impl Node for FixedCondition {
    fn node_type(&self) -> &str {
        "condition"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let verdict = match self.exit_after {
            Some(limit) => ctx.iteration >= limit,
            None => self.verdict,
        };
        Ok(NodeOutput::new().with_output("result", verdict))
    }
}

pub struct FailingNode;

#[async_trait]
impl Node for FailingNode {
    fn node_type(&self) -> &str {
        "failing"
    }

    async fn execute(&self, _ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Err(NodeError::ExecutionFailed("boom".to_string()))
    }
}

/// Sleeps for `delay_ms`, bailing out early when cancelled.
pub struct SlowNode {
    delay: Duration,
}

#[async_trait]
impl Node for SlowNode {
    fn node_type(&self) -> &str {
        "slow"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => Ok(NodeOutput::new().with_output("data", "slept")),
            _ = ctx.cancellation.cancelled() => Ok(NodeOutput::new().with_output("data", "interrupted")),
        }
    }
}

fn definition(node_type: &str, category: &str) -> NodeDefinition {
    NodeDefinition::new(
        node_type,
        node_type.replace('_', " "),
        format!("test {} node", node_type),
        category,
        json!({}),
        json!({}),
    )
    .unwrap()
}

fn echo(required: &'static [&'static str]) -> impl Fn(&NodeConfig) -> Result<Box<dyn Node>, NodeError> {
    move |node: &NodeConfig| {
        Ok(Box::new(EchoNode {
            id: node.id().to_string(),
            required: required.iter().map(|s| s.to_string()).collect(),
            config: node.clone(),
        }) as Box<dyn Node>)
    }
}

pub fn test_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry
        .register_fn(definition("data_source", "data_source"), echo(&[]))
        .unwrap();
    registry
        .register_fn(definition("data_processor", "data_processor"), echo(&[]))
        .unwrap();
    registry
        .register_fn(definition("output", "output"), echo(&[]))
        .unwrap();
    registry
        .register_fn(definition("http_request", "http_request"), echo(&["url"]))
        .unwrap();
    registry
        .register_fn(definition("condition", "condition"), |node: &NodeConfig| {
            Ok(Box::new(FixedCondition {
                verdict: node.get("verdict").and_then(Value::as_bool).unwrap_or(false),
                exit_after: node.get("exit_after").and_then(Value::as_f64).map(|n| n as u32),
            }) as Box<dyn Node>)
        })
        .unwrap();
    registry
        .register_fn(definition("failing", "utility"), |_: &NodeConfig| {
            Ok(Box::new(FailingNode) as Box<dyn Node>)
        })
        .unwrap();
    registry
        .register_fn(definition("slow", "utility"), |node: &NodeConfig| {
            let delay_ms = node.get("delay_ms").and_then(Value::as_f64).unwrap_or(50.0);
            Ok(Box::new(SlowNode {
                delay: Duration::from_millis(delay_ms as u64),
            }) as Box<dyn Node>)
        })
        .unwrap();
    registry
}

pub type Recorded = Arc<Mutex<Vec<(RunId, ExecutionEvent)>>>;

/// Sink that records every event it receives.
pub fn recording_sink() -> (impl EventSink, Recorded) {
    let events: Recorded = Arc::new(Mutex::new(Vec::new()));
    let captured = events.clone();
    let sink = FnSink::new(move |run_id, event: &ExecutionEvent| {
        captured.lock().unwrap().push((run_id, event.clone()));
    });
    (sink, events)
}

pub fn event_names(events: &Recorded) -> Vec<&'static str> {
    events.lock().unwrap().iter().map(|(_, e)| e.name()).collect()
}

pub fn config(pairs: &[(&str, Value)]) -> std::collections::HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
