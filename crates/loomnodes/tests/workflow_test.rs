use loomcore::{ValidationCode, Value, WorkflowDefinition};
use loomnodes::standard_registry;
use loomruntime::{FlowRuntime, RunStatus, RuntimeConfig};
use std::collections::HashMap;
use std::sync::Arc;

fn runtime() -> FlowRuntime {
    FlowRuntime::with_registry(Arc::new(standard_registry().unwrap()), RuntimeConfig::default())
}

fn config(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// start(0) -> increment -> check(data > limit) -> (increment | done)
fn counter_loop(limit: f64, max_iterations: u32) -> WorkflowDefinition {
    WorkflowDefinition::builder("counter")
        .node_with_config("start", "data_source", config(&[("data", Value::from(0.0))]))
        .node_with_config(
            "increment",
            "data_processor",
            config(&[
                ("operation", Value::from("increment")),
                ("source", Value::from("check")),
            ]),
        )
        .node_with_config(
            "check",
            "condition",
            config(&[
                ("operator", Value::from("greater_than")),
                ("value", Value::from(limit)),
            ]),
        )
        .node("done", "output")
        .edge("start", "increment")
        .edge("increment", "check")
        .conditional_edge("check", "increment", "false")
        .conditional_edge("check", "done", "true")
        .max_iterations(max_iterations)
        .build()
        .unwrap()
}

#[test]
fn test_standard_catalog() {
    let registry = standard_registry().unwrap();
    let types: Vec<&str> = registry.list().iter().map(|d| d.node_type.as_str()).collect();

    assert_eq!(
        types,
        vec!["condition", "data_processor", "data_source", "delay", "http_request", "output"]
    );
    assert_eq!(registry.get("delay").unwrap().category, "utility");
    assert_eq!(registry.list_by_category("condition").len(), 1);
}

#[tokio::test]
async fn test_counter_loop_exits_through_condition() {
    let runtime = runtime();
    let workflow = counter_loop(2.0, 10);

    let validation = runtime.validate(&workflow);
    assert!(validation.valid, "{}", validation);
    assert_eq!(validation.warnings_with(ValidationCode::ControlledLoop).count(), 1);

    let result = runtime.execute(&workflow, HashMap::new()).await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.execution_count("increment"), 3);
    assert_eq!(result.execution_count("check"), 3);
    assert_eq!(result.execution_count("done"), 1);
    assert_eq!(result.output("done", "data"), Some(&Value::from(3.0)));
}

#[tokio::test]
async fn test_counter_loop_hits_iteration_cap() {
    let result = runtime().execute(&counter_loop(100.0, 3), HashMap::new()).await;

    assert_eq!(result.status, RunStatus::LoopTerminated);
    assert!(result.success);
    assert_eq!(result.execution_count("increment"), 3);
    assert_eq!(result.output("increment", "data"), Some(&Value::from(3.0)));
    assert_eq!(result.execution_count("done"), 0);
}

#[tokio::test]
async fn test_failed_request_takes_fallback_branch() {
    let workflow = WorkflowDefinition::builder("fetch with fallback")
        .node_with_config(
            "fetch",
            "http_request",
            config(&[("url", Value::from("http://127.0.0.1:9/status"))]),
        )
        .node_with_config(
            "ok",
            "condition",
            config(&[
                ("field", Value::from("success")),
                ("operator", Value::from("equals")),
                ("value", Value::Bool(true)),
            ]),
        )
        .node("report", "output")
        .node("fallback", "output")
        .edge("fetch", "ok")
        .conditional_edge("ok", "report", "true")
        .conditional_edge("ok", "fallback", "false")
        .build()
        .unwrap();

    let result = runtime().execute(&workflow, HashMap::new()).await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.execution_count("fallback"), 1);
    assert_eq!(result.execution_count("report"), 0);
}

#[tokio::test]
async fn test_invalid_http_config_blocks_run() {
    let workflow = WorkflowDefinition::builder("bad fetch")
        .node_with_config("fetch", "http_request", config(&[("url", Value::from("ftp://example.com"))]))
        .node("sink", "output")
        .edge("fetch", "sink")
        .build()
        .unwrap();

    let result = runtime().execute(&workflow, HashMap::new()).await;

    assert_eq!(result.status, RunStatus::Failed);
    let validation = result.validation.unwrap();
    let invalid: Vec<_> = validation.errors_with(ValidationCode::InvalidNodeConfig).collect();
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].node_ids, vec!["fetch"]);
}

#[tokio::test]
async fn test_pipeline_reads_initial_state() {
    let workflow = WorkflowDefinition::builder("shout")
        .node_with_config("source", "data_source", config(&[("state_key", Value::from("name"))]))
        .node_with_config(
            "shout",
            "data_processor",
            config(&[("operation", Value::from("uppercase"))]),
        )
        .node("sink", "output")
        .edge("source", "shout")
        .edge("shout", "sink")
        .build()
        .unwrap();

    let result = runtime()
        .execute(&workflow, config(&[("name", Value::from("loom"))]))
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.output("sink", "data"), Some(&Value::from("LOOM")));
}
