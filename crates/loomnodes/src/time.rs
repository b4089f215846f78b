use async_trait::async_trait;
use loomcore::{ConfigFieldError, Node, NodeConfig, NodeContext, NodeError, NodeOutput};
use loomruntime::{NodeDefinition, NodeFactory};
use serde_json::json;
use tokio::time::{sleep, Duration};

const DEFAULT_DELAY_MS: f64 = 1000.0;

/// Delay execution for a specified duration, then pass upstream data through
pub struct DelayNode {
    config: NodeConfig,
}

impl DelayNode {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    fn delay_ms(&self) -> Option<f64> {
        match self.config.get("delay_ms") {
            None => Some(DEFAULT_DELAY_MS),
            Some(value) => value.as_f64().filter(|ms| *ms >= 0.0),
        }
    }
}

#[async_trait]
impl Node for DelayNode {
    fn node_type(&self) -> &str {
        "delay"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let delay_ms = self
            .delay_ms()
            .ok_or_else(|| NodeError::Configuration("delay_ms must be a non-negative number".to_string()))?
            as u64;

        tracing::debug!(node_id = %ctx.node_id, delay_ms, "Delaying");

        let cancelled = tokio::select! {
            _ = sleep(Duration::from_millis(delay_ms)) => false,
            _ = ctx.cancellation.cancelled() => true,
        };

        Ok(NodeOutput::new()
            .with_output("data", ctx.find_input("data").cloned().unwrap_or_default())
            .with_output("cancelled", cancelled))
    }

    fn validate_config(&self) -> Vec<ConfigFieldError> {
        match self.delay_ms() {
            Some(_) => Vec::new(),
            None => vec![ConfigFieldError::new("delay_ms", "must be a non-negative number")],
        }
    }
}

pub struct DelayNodeFactory;

impl NodeFactory for DelayNodeFactory {
    fn create(&self, node: &NodeConfig) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(DelayNode::new(node.clone())))
    }

    fn node_type(&self) -> &str {
        "delay"
    }

    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            node_type: "delay".to_string(),
            display_name: "Delay".to_string(),
            description: "Delay execution for specified milliseconds".to_string(),
            category: "utility".to_string(),
            input_schema: json!({"data": "any"}),
            output_schema: json!({"data": "any", "cancelled": "boolean"}),
            icon: Some("clock".to_string()),
            color: None,
        }
    }
}

