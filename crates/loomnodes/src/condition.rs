use async_trait::async_trait;
use loomcore::{ConfigFieldError, Node, NodeConfig, NodeContext, NodeError, NodeOutput, Value};
use loomruntime::{NodeDefinition, NodeFactory};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Exists,
    Truthy,
}

impl Operator {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "equals" => Some(Self::Equals),
            "not_equals" => Some(Self::NotEquals),
            "greater_than" => Some(Self::GreaterThan),
            "less_than" => Some(Self::LessThan),
            "exists" => Some(Self::Exists),
            "truthy" => Some(Self::Truthy),
            _ => None,
        }
    }

    fn needs_operand(self) -> bool {
        !matches!(self, Operator::Exists | Operator::Truthy)
    }

    /// Compare `actual` (absent when no upstream produced the field).
    pub fn evaluate(self, actual: Option<&Value>, expected: Option<&Value>) -> bool {
        match self {
            Operator::Exists => actual.is_some_and(|v| !v.is_null()),
            Operator::Truthy => actual.is_some_and(Value::is_truthy),
            Operator::Equals => actual == expected,
            Operator::NotEquals => actual != expected,
            Operator::GreaterThan => compare(actual, expected).is_some_and(|(a, b)| a > b),
            Operator::LessThan => compare(actual, expected).is_some_and(|(a, b)| a < b),
        }
    }
}

fn compare(actual: Option<&Value>, expected: Option<&Value>) -> Option<(f64, f64)> {
    Some((actual?.as_f64()?, expected?.as_f64()?))
}

/// Produces the boolean verdict that picks a branch or closes a loop.
///
/// Emits `result` plus the upstream `data`, so a loop body reading from the
/// condition keeps seeing the value that was tested.
pub struct ConditionNode {
    config: NodeConfig,
}

impl ConditionNode {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    fn field(&self) -> &str {
        self.config
            .get("field")
            .and_then(Value::as_str)
            .unwrap_or("data")
    }

    fn operator(&self) -> Option<Operator> {
        match self.config.get("operator") {
            None => Some(Operator::Truthy),
            Some(value) => value.as_str().and_then(Operator::parse),
        }
    }
}

#[async_trait]
impl Node for ConditionNode {
    fn node_type(&self) -> &str {
        loomcore::CONDITION_NODE_TYPE
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let operator = self
            .operator()
            .ok_or_else(|| NodeError::Configuration("unknown operator".to_string()))?;
        let actual = ctx.find_input(self.field());
        let verdict = operator.evaluate(actual, self.config.get("value"));

        tracing::debug!(
            node_id = %ctx.node_id,
            iteration = ctx.iteration,
            field = self.field(),
            ?operator,
            verdict,
            "Condition evaluated"
        );

        Ok(NodeOutput::new()
            .with_output("result", verdict)
            .with_output("data", ctx.find_input("data").cloned().unwrap_or_default()))
    }

    fn validate_config(&self) -> Vec<ConfigFieldError> {
        let Some(operator) = self.operator() else {
            return vec![ConfigFieldError::new(
                "operator",
                "must be one of equals, not_equals, greater_than, less_than, exists, truthy",
            )];
        };

        let mut errors = Vec::new();
        if matches!(self.config.get("field"), Some(v) if v.as_str().map_or(true, str::is_empty)) {
            errors.push(ConfigFieldError::new("field", "must be a non-empty string"));
        }
        match (operator, self.config.get("value")) {
            (op, None) if op.needs_operand() => {
                errors.push(ConfigFieldError::new("value", "is required for this operator"));
            }
            (Operator::GreaterThan | Operator::LessThan, Some(v)) if v.as_f64().is_none() => {
                errors.push(ConfigFieldError::new("value", "must be a number"));
            }
            _ => {}
        }
        errors
    }
}

pub struct ConditionNodeFactory;

impl NodeFactory for ConditionNodeFactory {
    fn create(&self, node: &NodeConfig) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(ConditionNode::new(node.clone())))
    }

    fn node_type(&self) -> &str {
        loomcore::CONDITION_NODE_TYPE
    }

    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            node_type: loomcore::CONDITION_NODE_TYPE.to_string(),
            display_name: "Condition".to_string(),
            description: "Tests an upstream field and emits a boolean verdict".to_string(),
            category: "condition".to_string(),
            input_schema: json!({"data": "any"}),
            output_schema: json!({"result": "boolean", "data": "any"}),
            icon: Some("git-branch".to_string()),
            color: Some("#f59e0b".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operators() {
        let three = Value::from(3.0);
        let five = Value::from(5.0);

        assert!(Operator::GreaterThan.evaluate(Some(&five), Some(&three)));
        assert!(!Operator::LessThan.evaluate(Some(&five), Some(&three)));
        assert!(!Operator::GreaterThan.evaluate(None, Some(&three)));
        assert!(Operator::Equals.evaluate(Some(&three), Some(&Value::from(3.0))));
        assert!(Operator::NotEquals.evaluate(None, Some(&three)));
        assert!(!Operator::Exists.evaluate(Some(&Value::Null), None));
        assert!(!Operator::Truthy.evaluate(Some(&Value::from("")), None));
    }
}
