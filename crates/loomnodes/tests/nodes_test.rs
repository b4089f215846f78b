use loomcore::{Node, NodeConfig, NodeContext, NodeError, Value};
use loomnodes::{
    ConditionNode, DataProcessorNode, DataSourceNode, DelayNode, HttpRequestNode, OutputNode,
};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

// Helper function to create a node config
fn node_config(node_type: &str, pairs: &[(&str, Value)]) -> NodeConfig {
    let config = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    NodeConfig::new("node", node_type, config).unwrap()
}

fn outputs(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn context() -> NodeContext {
    NodeContext::new(Uuid::new_v4(), "node")
}

#[tokio::test]
async fn test_data_source_inline_and_initial_state() {
    let inline = DataSourceNode::new(node_config("data_source", &[("data", Value::from("hello"))]));
    let output = inline.execute(context()).await.unwrap();
    assert_eq!(output.outputs.get("data"), Some(&Value::from("hello")));

    let seeded = DataSourceNode::new(node_config("data_source", &[("state_key", Value::from("count"))]));
    let ctx = context().with_initial(outputs(&[("count", Value::from(7.0))]));
    let output = seeded.execute(ctx).await.unwrap();
    assert_eq!(output.outputs.get("data"), Some(&Value::from(7.0)));

    let missing = seeded.execute(context()).await;
    assert!(matches!(missing, Err(NodeError::MissingInput(key)) if key == "count"));
}

#[test]
fn test_data_source_needs_data_or_state_key() {
    let node = DataSourceNode::new(node_config("data_source", &[]));
    let errors = node.validate_config();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "data");
}

#[tokio::test]
async fn test_data_processor_prefers_configured_source() {
    let node = DataProcessorNode::new(node_config(
        "data_processor",
        &[("operation", Value::from("increment")), ("source", Value::from("check"))],
    ));

    let first = context().with_input("start", outputs(&[("data", Value::from(0.0))]));
    let output = node.execute(first).await.unwrap();
    assert_eq!(output.outputs.get("data"), Some(&Value::from(1.0)));

    let looped = context()
        .with_input("start", outputs(&[("data", Value::from(0.0))]))
        .with_input("check", outputs(&[("data", Value::from(4.0))]));
    let output = node.execute(looped).await.unwrap();
    assert_eq!(output.outputs.get("data"), Some(&Value::from(5.0)));
}

#[tokio::test]
async fn test_data_processor_type_mismatch_is_an_error() {
    let node = DataProcessorNode::new(node_config("data_processor", &[("operation", Value::from("uppercase"))]));
    let ctx = context().with_input("src", outputs(&[("data", Value::from(3.0))]));

    match node.execute(ctx).await {
        Err(NodeError::InvalidInputType { expected, actual, .. }) => {
            assert_eq!(expected, "string");
            assert_eq!(actual, "number");
        }
        other => panic!("expected a type mismatch, got {:?}", other.map(|o| o.outputs)),
    }
}

#[tokio::test]
async fn test_condition_emits_verdict_and_data() {
    let node = ConditionNode::new(node_config(
        "condition",
        &[
            ("field", Value::from("data")),
            ("operator", Value::from("greater_than")),
            ("value", Value::from(2.0)),
        ],
    ));
    assert!(node.validate_config().is_empty());

    let low = context().with_input("process", outputs(&[("data", Value::from(2.0))]));
    let output = node.execute(low).await.unwrap();
    assert_eq!(output.verdict(), Some(false));
    assert_eq!(output.outputs.get("data"), Some(&Value::from(2.0)));

    let high = context().with_input("process", outputs(&[("data", Value::from(3.0))]));
    assert_eq!(node.execute(high).await.unwrap().verdict(), Some(true));
}

#[test]
fn test_condition_config_errors() {
    let unknown = ConditionNode::new(node_config("condition", &[("operator", Value::from("matches"))]));
    assert_eq!(unknown.validate_config()[0].field, "operator");

    let no_operand = ConditionNode::new(node_config("condition", &[("operator", Value::from("equals"))]));
    assert_eq!(no_operand.validate_config()[0].field, "value");

    let not_numeric = ConditionNode::new(node_config(
        "condition",
        &[("operator", Value::from("less_than")), ("value", Value::from("ten"))],
    ));
    assert_eq!(not_numeric.validate_config()[0].error, "must be a number");

    let defaults = ConditionNode::new(node_config("condition", &[]));
    assert!(defaults.validate_config().is_empty());
}

#[tokio::test]
async fn test_output_collects_upstream() {
    let ctx = context()
        .with_input("left", outputs(&[("data", Value::from("l"))]))
        .with_input("right", outputs(&[("data", Value::from("r"))]));

    let output = OutputNode.execute(ctx).await.unwrap();

    let result = output.outputs.get("result").and_then(Value::as_object).unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(output.outputs.get("data"), Some(&Value::from("l")));
}

#[tokio::test]
async fn test_delay_is_cancellable() {
    let node = DelayNode::new(node_config("delay", &[("delay_ms", Value::from(10_000.0))]));
    let ctx = context().with_input("src", outputs(&[("data", Value::from("kept"))]));
    let token = ctx.cancellation.clone();

    let handle = tokio::spawn(async move { node.execute(ctx).await });
    token.cancel();
    let output = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(output.outputs.get("cancelled"), Some(&Value::Bool(true)));
    assert_eq!(output.outputs.get("data"), Some(&Value::from("kept")));
}

#[test]
fn test_delay_rejects_negative_duration() {
    let node = DelayNode::new(node_config("delay", &[("delay_ms", Value::from(-5.0))]));
    assert_eq!(node.validate_config()[0].field, "delay_ms");
}

#[tokio::test]
async fn test_http_transport_error_is_data() {
    let node = HttpRequestNode::new(node_config(
        "http_request",
        &[("url", Value::from("http://127.0.0.1:9/unreachable"))],
    ));

    let output = node.execute(context()).await.unwrap();

    assert_eq!(output.outputs.get("success"), Some(&Value::Bool(false)));
    assert!(output
        .outputs
        .get("error")
        .and_then(Value::as_str)
        .unwrap()
        .contains("HTTP request failed"));
}
