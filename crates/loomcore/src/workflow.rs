use crate::{Value, WorkflowError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub type NodeId = String;

/// Cap on executions of any single node in one run, unless overridden.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// One vertex of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeConfig {
    id: NodeId,
    #[serde(rename = "type")]
    node_type: String,
    config: HashMap<String, Value>,
}

impl NodeConfig {
    /// The type is only checked for emptiness here; whether it resolves in
    /// the registry is a build-time concern.
    pub fn new(
        id: impl Into<NodeId>,
        node_type: impl Into<String>,
        config: HashMap<String, Value>,
    ) -> Result<Self, WorkflowError> {
        let id = id.into();
        let node_type = node_type.into();
        if id.trim().is_empty() {
            return Err(WorkflowError::EmptyNodeId);
        }
        if node_type.trim().is_empty() {
            return Err(WorkflowError::EmptyNodeType { node_id: id });
        }
        Ok(Self {
            id,
            node_type,
            config,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn config(&self) -> &HashMap<String, Value> {
        &self.config
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    /// Returns a copy with one more config entry.
    pub fn with_config(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut next = self.clone();
        next.config.insert(key.into(), value.into());
        next
    }
}

/// One directed arc. An absent condition means "unconditional".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeDefinition {
    id: String,
    source: NodeId,
    target: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    condition: Option<String>,
}

impl EdgeDefinition {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
    ) -> Result<Self, WorkflowError> {
        Self::with_optional_condition(id, source, target, None)
    }

    pub fn conditional(
        id: impl Into<String>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        condition: impl Into<String>,
    ) -> Result<Self, WorkflowError> {
        Self::with_optional_condition(id, source, target, Some(condition.into()))
    }

    fn with_optional_condition(
        id: impl Into<String>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        condition: Option<String>,
    ) -> Result<Self, WorkflowError> {
        let id = id.into();
        let source = source.into();
        let target = target.into();
        if id.trim().is_empty() {
            return Err(WorkflowError::EmptyEdgeId);
        }
        if source.trim().is_empty() || target.trim().is_empty() {
            return Err(WorkflowError::EmptyNodeId);
        }
        if source == target {
            return Err(WorkflowError::SelfLoop {
                edge_id: id,
                node_id: source,
            });
        }
        Ok(Self {
            id,
            source,
            target,
            condition: condition.filter(|c| !c.trim().is_empty()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }
}

/// A complete, structurally sound workflow graph.
///
/// Construction rejects duplicate node ids, edges with unknown endpoints and
/// an ambiguous entry point. The value is immutable; the `with_*` methods
/// return a new instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WorkflowSpec", into = "WorkflowSpec")]
pub struct WorkflowDefinition {
    name: String,
    nodes: Vec<NodeConfig>,
    edges: Vec<EdgeDefinition>,
    entry_point: NodeId,
    max_iterations: u32,
}

impl WorkflowDefinition {
    pub fn new(
        name: impl Into<String>,
        nodes: Vec<NodeConfig>,
        edges: Vec<EdgeDefinition>,
        entry_point: Option<NodeId>,
        max_iterations: Option<u32>,
    ) -> Result<Self, WorkflowError> {
        if nodes.is_empty() {
            return Err(WorkflowError::EmptyWorkflow);
        }

        let mut node_ids = HashSet::new();
        for node in &nodes {
            if !node_ids.insert(node.id()) {
                return Err(WorkflowError::DuplicateNodeId(node.id().to_string()));
            }
        }

        let mut edge_ids = HashSet::new();
        let mut has_incoming = HashSet::new();
        for edge in &edges {
            if !edge_ids.insert(edge.id()) {
                return Err(WorkflowError::DuplicateEdgeId(edge.id().to_string()));
            }
            for endpoint in [edge.source(), edge.target()] {
                if !node_ids.contains(endpoint) {
                    return Err(WorkflowError::UnknownEdgeEndpoint {
                        edge_id: edge.id().to_string(),
                        node_id: endpoint.to_string(),
                    });
                }
            }
            has_incoming.insert(edge.target());
        }

        let entry_point = match entry_point {
            Some(entry) => {
                if !node_ids.contains(entry.as_str()) {
                    return Err(WorkflowError::EntryPointNotFound(entry));
                }
                entry
            }
            None => {
                let roots: Vec<&str> = nodes
                    .iter()
                    .map(NodeConfig::id)
                    .filter(|id| !has_incoming.contains(id))
                    .collect();
                match roots.as_slice() {
                    [single] => single.to_string(),
                    // every node has a predecessor: fall back to declaration order
                    [] => nodes[0].id().to_string(),
                    _ => {
                        return Err(WorkflowError::AmbiguousEntryPoint {
                            candidates: roots.iter().map(|id| id.to_string()).collect(),
                        })
                    }
                }
            }
        };

        let max_iterations = max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
        if max_iterations == 0 {
            return Err(WorkflowError::InvalidMaxIterations(max_iterations));
        }

        Ok(Self {
            name: name.into(),
            nodes,
            edges,
            entry_point,
            max_iterations,
        })
    }

    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[NodeConfig] {
        &self.nodes
    }

    pub fn edges(&self) -> &[EdgeDefinition] {
        &self.edges
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id() == id)
    }

    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a EdgeDefinition> + 'a {
        self.edges.iter().filter(move |e| e.source() == id)
    }

    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a EdgeDefinition> + 'a {
        self.edges.iter().filter(move |e| e.target() == id)
    }

    pub fn with_max_iterations(&self, max_iterations: u32) -> Result<Self, WorkflowError> {
        Self::new(
            self.name.clone(),
            self.nodes.clone(),
            self.edges.clone(),
            Some(self.entry_point.clone()),
            Some(max_iterations),
        )
    }

    pub fn with_entry_point(&self, entry_point: impl Into<NodeId>) -> Result<Self, WorkflowError> {
        Self::new(
            self.name.clone(),
            self.nodes.clone(),
            self.edges.clone(),
            Some(entry_point.into()),
            Some(self.max_iterations),
        )
    }
}

/// Incremental construction; every invariant is checked in [`build`](Self::build).
#[derive(Debug, Default)]
pub struct WorkflowBuilder {
    name: String,
    nodes: Vec<NodeSpec>,
    edges: Vec<EdgeSpec>,
    entry_point: Option<NodeId>,
    max_iterations: Option<u32>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn node(self, id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        self.node_with_config(id, node_type, HashMap::new())
    }

    pub fn node_with_config(
        mut self,
        id: impl Into<NodeId>,
        node_type: impl Into<String>,
        config: HashMap<String, Value>,
    ) -> Self {
        self.nodes.push(NodeSpec {
            id: id.into(),
            node_type: node_type.into(),
            config,
        });
        self
    }

    pub fn edge(self, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        self.push_edge(source.into(), target.into(), None)
    }

    pub fn conditional_edge(
        self,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        condition: impl Into<String>,
    ) -> Self {
        self.push_edge(source.into(), target.into(), Some(condition.into()))
    }

    fn push_edge(mut self, source: NodeId, target: NodeId, condition: Option<String>) -> Self {
        let id = format!("e{}", self.edges.len() + 1);
        self.edges.push(EdgeSpec {
            id,
            source,
            target,
            condition,
        });
        self
    }

    pub fn entry_point(mut self, entry_point: impl Into<NodeId>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn build(self) -> Result<WorkflowDefinition, WorkflowError> {
        WorkflowSpec {
            name: self.name,
            nodes: self.nodes,
            edges: self.edges,
            entry_point: self.entry_point,
            max_iterations: self.max_iterations,
        }
        .try_into()
    }
}

/// Serialized form of a [`WorkflowDefinition`]:
/// `{nodes: [{id, type, config}], edges: [{id, source, target, condition?}], entry_point?, max_iterations?}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowSpec {
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Generated as `e<n>` when omitted.
    #[serde(default)]
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl TryFrom<WorkflowSpec> for WorkflowDefinition {
    type Error = WorkflowError;

    fn try_from(spec: WorkflowSpec) -> Result<Self, Self::Error> {
        let nodes = spec
            .nodes
            .into_iter()
            .map(|n| NodeConfig::new(n.id, n.node_type, n.config))
            .collect::<Result<Vec<_>, _>>()?;

        let edges = spec
            .edges
            .into_iter()
            .enumerate()
            .map(|(i, e)| {
                let id = if e.id.is_empty() {
                    format!("e{}", i + 1)
                } else {
                    e.id
                };
                EdgeDefinition::with_optional_condition(id, e.source, e.target, e.condition)
            })
            .collect::<Result<Vec<_>, _>>()?;

        WorkflowDefinition::new(spec.name, nodes, edges, spec.entry_point, spec.max_iterations)
    }
}

impl From<WorkflowDefinition> for WorkflowSpec {
    fn from(def: WorkflowDefinition) -> Self {
        WorkflowSpec {
            name: def.name,
            nodes: def
                .nodes
                .into_iter()
                .map(|n| NodeSpec {
                    id: n.id,
                    node_type: n.node_type,
                    config: n.config,
                })
                .collect(),
            edges: def
                .edges
                .into_iter()
                .map(|e| EdgeSpec {
                    id: e.id,
                    source: e.source,
                    target: e.target,
                    condition: e.condition,
                })
                .collect(),
            entry_point: Some(def.entry_point),
            max_iterations: Some(def.max_iterations),
        }
    }
}
