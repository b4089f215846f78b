use async_trait::async_trait;
use loomcore::{ConfigFieldError, Node, NodeConfig, NodeContext, NodeError, NodeOutput, Value};
use loomruntime::{NodeDefinition, NodeFactory};
use serde_json::json;

/// Seeds a run with data, either inline from config or from the initial state.
pub struct DataSourceNode {
    config: NodeConfig,
}

impl DataSourceNode {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Node for DataSourceNode {
    fn node_type(&self) -> &str {
        "data_source"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        if let Some(data) = self.config.get("data") {
            return Ok(NodeOutput::new().with_output("data", data.clone()));
        }

        let key = self
            .config
            .get("state_key")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Configuration("either 'data' or 'state_key' is required".to_string()))?;
        let data = ctx
            .initial
            .get(key)
            .cloned()
            .ok_or_else(|| NodeError::MissingInput(key.to_string()))?;

        tracing::debug!(node_id = %ctx.node_id, state_key = key, "Read data from initial state");
        Ok(NodeOutput::new().with_output("data", data))
    }

    fn validate_config(&self) -> Vec<ConfigFieldError> {
        let has_data = self.config.get("data").is_some();
        match self.config.get("state_key") {
            Some(Value::String(key)) if !key.is_empty() => Vec::new(),
            Some(_) => vec![ConfigFieldError::new("state_key", "must be a non-empty string")],
            None if has_data => Vec::new(),
            None => vec![ConfigFieldError::new("data", "either 'data' or 'state_key' is required")],
        }
    }
}

pub struct DataSourceNodeFactory;

impl NodeFactory for DataSourceNodeFactory {
    fn create(&self, node: &NodeConfig) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(DataSourceNode::new(node.clone())))
    }

    fn node_type(&self) -> &str {
        "data_source"
    }

    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            node_type: "data_source".to_string(),
            display_name: "Data Source".to_string(),
            description: "Emits inline data or a value from the run's initial state".to_string(),
            category: "data_source".to_string(),
            input_schema: json!({}),
            output_schema: json!({"data": "any"}),
            icon: Some("database".to_string()),
            color: None,
        }
    }
}

/// Transformations a `data_processor` can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Passthrough,
    Uppercase,
    Lowercase,
    Length,
    Increment,
    JsonParse,
    JsonStringify,
}

impl Operation {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "passthrough" => Some(Self::Passthrough),
            "uppercase" => Some(Self::Uppercase),
            "lowercase" => Some(Self::Lowercase),
            "length" => Some(Self::Length),
            "increment" => Some(Self::Increment),
            "json_parse" => Some(Self::JsonParse),
            "json_stringify" => Some(Self::JsonStringify),
            _ => None,
        }
    }

    fn apply(self, input: &Value, step: f64) -> Result<Value, NodeError> {
        match self {
            Operation::Passthrough => Ok(input.clone()),
            Operation::Uppercase => expect_str(input).map(|s| Value::from(s.to_uppercase())),
            Operation::Lowercase => expect_str(input).map(|s| Value::from(s.to_lowercase())),
            Operation::Length => match input {
                Value::String(s) => Ok(Value::from(s.chars().count() as f64)),
                Value::Array(items) => Ok(Value::from(items.len() as f64)),
                Value::Object(map) => Ok(Value::from(map.len() as f64)),
                other => Err(type_mismatch("string, array or object", other)),
            },
            Operation::Increment => match input {
                Value::Null => Ok(Value::from(step)),
                Value::Number(n) => Ok(Value::from(n + step)),
                other => Err(type_mismatch("number", other)),
            },
            Operation::JsonParse => {
                let text = expect_str(input)?;
                let parsed: serde_json::Value = serde_json::from_str(text)
                    .map_err(|e| NodeError::ExecutionFailed(format!("JSON parse error: {}", e)))?;
                Ok(Value::from(parsed))
            }
            Operation::JsonStringify => serde_json::to_string(input)
                .map(Value::from)
                .map_err(|e| NodeError::ExecutionFailed(format!("JSON stringify error: {}", e))),
        }
    }
}

fn expect_str(value: &Value) -> Result<&str, NodeError> {
    value.as_str().ok_or_else(|| type_mismatch("string", value))
}

fn type_mismatch(expected: &str, actual: &Value) -> NodeError {
    NodeError::InvalidInputType {
        field: "data".to_string(),
        expected: expected.to_string(),
        actual: actual.kind().to_string(),
    }
}

/// Applies one [`Operation`] to the upstream `data` value.
///
/// With several producers (a loop body fed by both its entry edge and its
/// back edge) the `source` config names the producer to prefer.
pub struct DataProcessorNode {
    config: NodeConfig,
}

impl DataProcessorNode {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    fn operation(&self) -> Result<Operation, NodeError> {
        match self.config.get("operation") {
            None => Ok(Operation::Passthrough),
            Some(value) => value
                .as_str()
                .and_then(Operation::parse)
                .ok_or_else(|| NodeError::Configuration(format!("unknown operation: {:?}", value))),
        }
    }
}

#[async_trait]
impl Node for DataProcessorNode {
    fn node_type(&self) -> &str {
        "data_processor"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let operation = self.operation()?;
        let preferred = self.config.get("source").and_then(Value::as_str);
        let input = crate::upstream_value(&ctx, "data", preferred)
            .cloned()
            .unwrap_or_default();
        let step = self.config.get("by").and_then(Value::as_f64).unwrap_or(1.0);

        let data = operation.apply(&input, step)?;
        tracing::debug!(node_id = %ctx.node_id, iteration = ctx.iteration, ?operation, "Processed data");

        Ok(NodeOutput::new().with_output("data", data))
    }

    fn validate_config(&self) -> Vec<ConfigFieldError> {
        let mut errors = Vec::new();
        if self.operation().is_err() {
            errors.push(ConfigFieldError::new(
                "operation",
                "must be one of passthrough, uppercase, lowercase, length, increment, json_parse, json_stringify",
            ));
        }
        if matches!(self.config.get("by"), Some(v) if v.as_f64().is_none()) {
            errors.push(ConfigFieldError::new("by", "must be a number"));
        }
        errors
    }
}

pub struct DataProcessorNodeFactory;

impl NodeFactory for DataProcessorNodeFactory {
    fn create(&self, node: &NodeConfig) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(DataProcessorNode::new(node.clone())))
    }

    fn node_type(&self) -> &str {
        "data_processor"
    }

    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            node_type: "data_processor".to_string(),
            display_name: "Data Processor".to_string(),
            description: "Transforms upstream data with a named operation".to_string(),
            category: "data_processor".to_string(),
            input_schema: json!({"data": "any"}),
            output_schema: json!({"data": "any"}),
            icon: Some("cog".to_string()),
            color: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operations() {
        assert_eq!(
            Operation::Uppercase.apply(&Value::from("loom"), 1.0).unwrap(),
            Value::from("LOOM")
        );
        assert_eq!(
            Operation::Length.apply(&Value::from("héllo"), 1.0).unwrap(),
            Value::from(5.0)
        );
        assert_eq!(
            Operation::Increment.apply(&Value::Null, 2.0).unwrap(),
            Value::from(2.0)
        );
        assert!(Operation::Increment.apply(&Value::from("x"), 1.0).is_err());
    }

    #[test]
    fn test_json_operations() {
        let parsed = Operation::JsonParse
            .apply(&Value::from(r#"{"n": 3}"#), 1.0)
            .unwrap();
        assert_eq!(parsed.as_object().unwrap()["n"], Value::from(3.0));

        let text = Operation::JsonStringify.apply(&Value::from(vec![Value::Bool(true)]), 1.0).unwrap();
        assert_eq!(text, Value::from("[true]"));
        assert!(Operation::JsonParse.apply(&Value::from("{"), 1.0).is_err());
    }

    #[test]
    fn test_unknown_operation_is_invalid() {
        let config = NodeConfig::new("p", "data_processor", Default::default())
            .unwrap()
            .with_config("operation", "reverse");
        let errors = DataProcessorNode::new(config).validate_config();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "operation");
    }
}
