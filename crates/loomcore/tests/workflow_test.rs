use loomcore::{
    EdgeDefinition, NodeConfig, Value, WorkflowDefinition, WorkflowError, DEFAULT_MAX_ITERATIONS,
};
use std::collections::HashMap;

fn node(id: &str, node_type: &str) -> NodeConfig {
    NodeConfig::new(id, node_type, HashMap::new()).unwrap()
}

fn edge(id: &str, source: &str, target: &str) -> EdgeDefinition {
    EdgeDefinition::new(id, source, target).unwrap()
}

#[test]
fn test_node_config_rejects_empty_fields() {
    assert_eq!(
        NodeConfig::new("", "output", HashMap::new()),
        Err(WorkflowError::EmptyNodeId)
    );
    assert_eq!(
        NodeConfig::new("sink", " ", HashMap::new()),
        Err(WorkflowError::EmptyNodeType {
            node_id: "sink".to_string()
        })
    );
}

#[test]
fn test_self_loop_edge_is_rejected() {
    let err = EdgeDefinition::new("e1", "a", "a").unwrap_err();
    assert_eq!(
        err,
        WorkflowError::SelfLoop {
            edge_id: "e1".to_string(),
            node_id: "a".to_string()
        }
    );
}

#[test]
fn test_blank_condition_means_unconditional() {
    let edge = EdgeDefinition::conditional("e1", "a", "b", "  ").unwrap();
    assert!(!edge.is_conditional());
}

#[test]
fn test_duplicate_node_ids_fail() {
    let err = WorkflowDefinition::new(
        "dup",
        vec![node("a", "data_source"), node("a", "output")],
        vec![],
        None,
        None,
    )
    .unwrap_err();
    assert_eq!(err, WorkflowError::DuplicateNodeId("a".to_string()));
}

#[test]
fn test_edge_to_unknown_node_fails() {
    let err = WorkflowDefinition::new(
        "dangling edge",
        vec![node("a", "data_source")],
        vec![edge("e1", "a", "ghost")],
        None,
        None,
    )
    .unwrap_err();
    assert_eq!(
        err,
        WorkflowError::UnknownEdgeEndpoint {
            edge_id: "e1".to_string(),
            node_id: "ghost".to_string()
        }
    );
}

#[test]
fn test_entry_point_inferred_from_unique_root() {
    let workflow = WorkflowDefinition::builder("linear")
        .node("source", "data_source")
        .node("processor", "data_processor")
        .edge("source", "processor")
        .build()
        .unwrap();

    assert_eq!(workflow.entry_point(), "source");
    assert_eq!(workflow.max_iterations(), DEFAULT_MAX_ITERATIONS);
}

#[test]
fn test_ambiguous_entry_point_requires_explicit_choice() {
    let builder = || {
        WorkflowDefinition::builder("two roots")
            .node("a", "data_source")
            .node("b", "data_source")
            .node("sink", "output")
            .edge("a", "sink")
            .edge("b", "sink")
    };

    match builder().build() {
        Err(WorkflowError::AmbiguousEntryPoint { candidates }) => {
            assert_eq!(candidates, vec!["a".to_string(), "b".to_string()]);
        }
        other => panic!("expected ambiguity, got {:?}", other),
    }

    let workflow = builder().entry_point("b").build().unwrap();
    assert_eq!(workflow.entry_point(), "b");
}

#[test]
fn test_fully_cyclic_graph_falls_back_to_first_node() {
    let workflow = WorkflowDefinition::builder("ring")
        .node("A", "data_processor")
        .node("B", "data_processor")
        .node("C", "data_processor")
        .edge("A", "B")
        .edge("B", "C")
        .edge("C", "A")
        .build()
        .unwrap();

    assert_eq!(workflow.entry_point(), "A");
}

#[test]
fn test_unknown_entry_point_and_zero_iterations_fail() {
    let base = WorkflowDefinition::builder("single")
        .node("only", "output")
        .build()
        .unwrap();

    assert_eq!(
        base.with_entry_point("nope"),
        Err(WorkflowError::EntryPointNotFound("nope".to_string()))
    );
    assert_eq!(
        base.with_max_iterations(0),
        Err(WorkflowError::InvalidMaxIterations(0))
    );
    assert_eq!(base.with_max_iterations(3).unwrap().max_iterations(), 3);
    assert_eq!(base.max_iterations(), DEFAULT_MAX_ITERATIONS);
}

#[test]
fn test_deserializes_graph_payload() {
    let json = r#"{
        "name": "loop",
        "nodes": [
            {"id": "start", "type": "data_source", "config": {"data": 1}},
            {"id": "check", "type": "condition"},
            {"id": "done", "type": "output"}
        ],
        "edges": [
            {"id": "e1", "source": "start", "target": "check"},
            {"source": "check", "target": "done", "condition": "true"}
        ],
        "max_iterations": 4
    }"#;

    let workflow: WorkflowDefinition = serde_json::from_str(json).unwrap();

    assert_eq!(workflow.entry_point(), "start");
    assert_eq!(workflow.max_iterations(), 4);
    assert_eq!(workflow.edges()[1].id(), "e2");
    assert_eq!(workflow.edges()[1].condition(), Some("true"));
    assert_eq!(
        workflow.find_node("start").unwrap().get("data"),
        Some(&Value::Number(1.0))
    );

    let round_trip: WorkflowDefinition =
        serde_json::from_str(&serde_json::to_string(&workflow).unwrap()).unwrap();
    assert_eq!(round_trip, workflow);
}

#[test]
fn test_deserializing_invalid_payload_fails() {
    let json = r#"{
        "nodes": [{"id": "a", "type": "output"}],
        "edges": [{"id": "e1", "source": "a", "target": "a"}]
    }"#;

    let err = serde_json::from_str::<WorkflowDefinition>(json).unwrap_err();
    assert!(err.to_string().contains("self-loop"));
}
