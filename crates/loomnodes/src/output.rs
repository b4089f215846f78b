use async_trait::async_trait;
use loomcore::{Node, NodeConfig, NodeContext, NodeError, NodeOutput};
use loomruntime::{NodeDefinition, NodeFactory};
use serde_json::json;

/// Collects every upstream output into a single `result` object keyed by
/// producer id, and forwards the upstream `data` for convenience.
pub struct OutputNode;

#[async_trait]
impl Node for OutputNode {
    fn node_type(&self) -> &str {
        "output"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let result = ctx.merged_inputs();
        tracing::info!(node_id = %ctx.node_id, producers = ctx.inputs.len(), "Workflow output collected");

        Ok(NodeOutput::new()
            .with_output("result", result)
            .with_output("data", ctx.find_input("data").cloned().unwrap_or_default()))
    }
}

pub struct OutputNodeFactory;

impl NodeFactory for OutputNodeFactory {
    fn create(&self, _node: &NodeConfig) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(OutputNode))
    }

    fn node_type(&self) -> &str {
        "output"
    }

    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            node_type: "output".to_string(),
            display_name: "Output".to_string(),
            description: "Collects upstream results".to_string(),
            category: "output".to_string(),
            input_schema: json!({"data": "any"}),
            output_schema: json!({"result": "object", "data": "any"}),
            icon: Some("flag".to_string()),
            color: None,
        }
    }
}
