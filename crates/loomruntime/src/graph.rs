//! Graph model analysis and validation.
//!
//! Everything here is pure: nothing executes, nothing is mutated, and each
//! call produces fresh results. Every simple cycle is enumerated, each one
//! anchored at the member a depth-first walk reaches first. The walk starts at
//! the entry point, then visits remaining nodes in declaration order, and
//! follows outgoing edges in declaration order, so the "first discovered
//! cycle" and each loop's back edge are deterministic.

use crate::error::GraphError;
use crate::registry::NodeRegistry;
use loomcore::{
    FlowError, NodeId, ValidationCode, ValidationIssue, ValidationResult, WorkflowDefinition,
    WorkflowError, CONDITION_NODE_TYPE,
};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// A cycle found in a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopInfo {
    /// Cycle members in walk order, starting at the node the back edge re-enters
    pub nodes: Vec<NodeId>,
    /// Id of the edge that closes the cycle
    pub back_edge: String,
    pub has_condition_exit: bool,
    pub condition_node_id: Option<NodeId>,
}

impl LoopInfo {
    /// Closed walk over the members, e.g. `[A, B, C, A]`.
    pub fn cycle_path(&self) -> Vec<NodeId> {
        let mut path = self.nodes.clone();
        if let Some(first) = self.nodes.first() {
            path.push(first.clone());
        }
        path
    }

    pub fn is_controlled(&self) -> bool {
        self.has_condition_exit
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.iter().any(|n| n == node_id)
    }
}

struct Frame {
    successors: Vec<(usize, NodeIndex)>,
    cursor: usize,
}

/// A simple cycle: members from the anchor onwards, and the edge positions
/// walked between them. The last edge returns to the anchor.
struct Cycle {
    members: Vec<NodeIndex>,
    edges: Vec<usize>,
}

struct LoopAnalysis {
    loops: Vec<LoopInfo>,
    /// Back edges whose every cycle is controlled
    ignorable: HashSet<String>,
}

/// Petgraph view of a definition. Edge weights are positions in `edges()`.
struct GraphIndex<'a> {
    definition: &'a WorkflowDefinition,
    graph: DiGraph<&'a str, usize>,
    index: HashMap<&'a str, NodeIndex>,
}

impl<'a> GraphIndex<'a> {
    fn new(definition: &'a WorkflowDefinition) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for node in definition.nodes() {
            index.insert(node.id(), graph.add_node(node.id()));
        }
        for (position, edge) in definition.edges().iter().enumerate() {
            // endpoints are guaranteed by WorkflowDefinition construction
            if let (Some(&from), Some(&to)) = (index.get(edge.source()), index.get(edge.target())) {
                graph.add_edge(from, to, position);
            }
        }

        Self {
            definition,
            graph,
            index,
        }
    }

    /// Outgoing `(edge position, target)` pairs in declaration order.
    fn successors(&self, node: NodeIndex) -> Vec<(usize, NodeIndex)> {
        let mut successors: Vec<(usize, NodeIndex)> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| (*e.weight(), e.target()))
            .collect();
        successors.sort_by_key(|(position, _)| *position);
        successors
    }

    fn degree(&self, node_id: &str, direction: Direction) -> usize {
        self.index
            .get(node_id)
            .map(|&idx| self.graph.edges_directed(idx, direction).count())
            .unwrap_or(0)
    }

    /// Entry point first, then every node in declaration order.
    fn walk_roots(&self) -> Vec<NodeIndex> {
        let entry = self.index.get(self.definition.entry_point()).copied();
        entry
            .into_iter()
            .chain(self.graph.node_indices().filter(move |idx| Some(*idx) != entry))
            .collect()
    }

    /// Depth-first preorder over the walk roots, following edges in
    /// declaration order. A cycle is anchored at its lowest-ranked member.
    fn preorder(&self) -> Vec<usize> {
        let mut rank = vec![usize::MAX; self.graph.node_count()];
        let mut next_rank = 0;

        for root in self.walk_roots() {
            if rank[root.index()] != usize::MAX {
                continue;
            }
            rank[root.index()] = next_rank;
            next_rank += 1;
            let mut stack = vec![Frame {
                successors: self.successors(root),
                cursor: 0,
            }];

            while let Some(frame) = stack.last_mut() {
                let Some((_, next)) = frame.successors.get(frame.cursor).copied() else {
                    stack.pop();
                    continue;
                };
                frame.cursor += 1;
                if rank[next.index()] == usize::MAX {
                    rank[next.index()] = next_rank;
                    next_rank += 1;
                    stack.push(Frame {
                        successors: self.successors(next),
                        cursor: 0,
                    });
                }
            }
        }

        rank
    }

    /// Every simple cycle, enumerated per strongly connected component.
    ///
    /// Each cycle is found once, from its lowest-ranked member, by walking
    /// only through higher-ranked members of the same component. Cycles are
    /// ordered by the rank of that anchor, then by edge declaration order.
    fn simple_cycles(&self, rank: &[usize]) -> Vec<Cycle> {
        let mut cycles = Vec::new();

        for component in tarjan_scc(&self.graph) {
            if component.len() < 2 {
                continue;
            }
            let members: HashSet<NodeIndex> = component.iter().copied().collect();

            for &start in &component {
                let allowed = |node: NodeIndex| {
                    node == start
                        || (members.contains(&node) && rank[node.index()] > rank[start.index()])
                };
                let mut path = vec![start];
                let mut edges: Vec<usize> = Vec::new();
                let mut stack = vec![Frame {
                    successors: self.successors(start),
                    cursor: 0,
                }];

                while let Some(frame) = stack.last_mut() {
                    let Some((position, next)) = frame.successors.get(frame.cursor).copied() else {
                        stack.pop();
                        path.pop();
                        edges.pop();
                        continue;
                    };
                    frame.cursor += 1;
                    if !allowed(next) {
                        continue;
                    }

                    if next == start {
                        let mut closed = edges.clone();
                        closed.push(position);
                        cycles.push(Cycle {
                            members: path.clone(),
                            edges: closed,
                        });
                    } else if !path.contains(&next) {
                        path.push(next);
                        edges.push(position);
                        stack.push(Frame {
                            successors: self.successors(next),
                            cursor: 0,
                        });
                    }
                }
            }
        }

        cycles.sort_by_key(|cycle| cycle.members.first().map(|idx| rank[idx.index()]));
        cycles
    }

    /// Classify every cycle and collect the back edges that may be ignored
    /// when ordering the graph.
    ///
    /// A back edge is ignorable only when every cycle running through it is
    /// controlled. Parallel edges can yield the same member list twice; the
    /// loop is reported once, with its first back edge.
    fn analyze(&self) -> LoopAnalysis {
        let rank = self.preorder();
        let cycles = self.simple_cycles(&rank);

        let mut loops: Vec<LoopInfo> = Vec::new();
        let mut all_controlled: HashMap<usize, bool> = HashMap::new();
        let mut closing: Vec<usize> = Vec::new();

        for cycle in &cycles {
            let nodes: Vec<NodeId> = cycle
                .members
                .iter()
                .map(|idx| self.graph[*idx].to_string())
                .collect();
            let condition_node_id = self.condition_exit(&nodes);
            let controlled = condition_node_id.is_some();
            for &position in &cycle.edges {
                *all_controlled.entry(position).or_insert(true) &= controlled;
            }

            let Some(&back_edge) = cycle.edges.last() else {
                continue;
            };
            closing.push(back_edge);
            if loops.iter().any(|l| l.nodes == nodes) {
                continue;
            }
            loops.push(LoopInfo {
                back_edge: self.definition.edges()[back_edge].id().to_string(),
                has_condition_exit: controlled,
                condition_node_id,
                nodes,
            });
        }

        let ignorable = closing
            .into_iter()
            .filter(|position| all_controlled.get(position).copied().unwrap_or(false))
            .map(|position| self.definition.edges()[position].id().to_string())
            .collect();

        LoopAnalysis { loops, ignorable }
    }


    /// The loop's exit node: its single `condition` member, provided that
    /// node has an edge to a target outside the cycle.
    fn condition_exit(&self, members: &[NodeId]) -> Option<NodeId> {
        let member_set: HashSet<&str> = members.iter().map(String::as_str).collect();
        let conditions: Vec<&NodeId> = members
            .iter()
            .filter(|id| {
                self.definition
                    .find_node(id)
                    .is_some_and(|n| n.node_type() == CONDITION_NODE_TYPE)
            })
            .collect();

        let [condition] = conditions.as_slice() else {
            return None;
        };
        self.definition
            .outgoing(condition)
            .any(|edge| !member_set.contains(edge.target()))
            .then(|| (*condition).clone())
    }
}

/// Every simple cycle in the graph, controlled or not.
pub fn detect_loops(definition: &WorkflowDefinition) -> Vec<LoopInfo> {
    GraphIndex::new(definition).analyze().loops
}

/// The first discovered cycle that is not a controlled loop.
///
/// Controlled loops are tolerated here; use [`detect_loops`] for full
/// loop metadata.
pub fn detect_cycle(definition: &WorkflowDefinition) -> Option<LoopInfo> {
    detect_loops(definition)
        .into_iter()
        .find(|l| !l.is_controlled())
}

/// Nodes other than the entry point with no edges at all.
pub fn find_dangling_nodes(definition: &WorkflowDefinition) -> Vec<NodeId> {
    let graph = GraphIndex::new(definition);
    definition
        .nodes()
        .iter()
        .map(|n| n.id())
        .filter(|id| *id != definition.entry_point())
        .filter(|id| {
            graph.degree(id, Direction::Incoming) == 0 && graph.degree(id, Direction::Outgoing) == 0
        })
        .map(str::to_string)
        .collect()
}

/// Nodes with no outgoing edge, regardless of type.
pub fn find_terminal_nodes(definition: &WorkflowDefinition) -> Vec<NodeId> {
    let graph = GraphIndex::new(definition);
    definition
        .nodes()
        .iter()
        .map(|n| n.id())
        .filter(|id| graph.degree(id, Direction::Outgoing) == 0)
        .map(str::to_string)
        .collect()
}

/// Kahn ordering with controlled-loop back edges ignored.
///
/// A back edge shared with an uncontrolled cycle is kept, so any
/// uncontrolled cycle makes the sort fail.
///
/// Ties are broken by declaration order with the entry point ahead of
/// everything else, so the entry point sorts first whenever nothing
/// outside a controlled loop points at it.
pub fn topological_sort(definition: &WorkflowDefinition) -> Result<Vec<NodeId>, GraphError> {
    let excluded = GraphIndex::new(definition).analyze().ignorable;
    kahn_order(definition, &excluded)
}

/// Execution order of the graph; same as [`topological_sort`].
pub fn get_execution_order(definition: &WorkflowDefinition) -> Result<Vec<NodeId>, GraphError> {
    topological_sort(definition)
}

fn kahn_order(
    definition: &WorkflowDefinition,
    excluded: &HashSet<String>,
) -> Result<Vec<NodeId>, GraphError> {
    let nodes = definition.nodes();
    let position: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id(), i)).collect();
    let entry = position.get(definition.entry_point()).copied();

    let mut in_degree = vec![0usize; nodes.len()];
    let mut forward: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for edge in definition.edges().iter().filter(|e| !excluded.contains(e.id())) {
        if let (Some(&from), Some(&to)) = (position.get(edge.source()), position.get(edge.target())) {
            forward[from].push(to);
            in_degree[to] += 1;
        }
    }

    let rank = |i: usize| (u8::from(Some(i) != entry), i);
    let mut ready: BTreeSet<(u8, usize)> = (0..nodes.len())
        .filter(|&i| in_degree[i] == 0)
        .map(rank)
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some((_, next)) = ready.pop_first() {
        order.push(nodes[next].id().to_string());
        for &target in &forward[next] {
            in_degree[target] -= 1;
            if in_degree[target] == 0 {
                ready.insert(rank(target));
            }
        }
    }

    if order.len() < nodes.len() {
        let stuck = (0..nodes.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| nodes[i].id().to_string())
            .collect();
        return Err(GraphError::UncontrolledCycle { nodes: stuck });
    }

    Ok(order)
}

/// Run every structural and per-node check.
pub fn validate(definition: &WorkflowDefinition, registry: &NodeRegistry) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let loops = detect_loops(definition);
    if let Some(cycle) = loops.iter().find(|l| !l.is_controlled()) {
        let path = cycle.cycle_path();
        errors.push(
            ValidationIssue::new(
                ValidationCode::CircularDependency,
                format!("Circular dependency detected: {}", path.join(" -> ")),
                cycle.nodes.clone(),
            )
            .with_context("cycle_path", path)
            .with_context("back_edge", cycle.back_edge.clone()),
        );
    }
    for controlled in loops.iter().filter(|l| l.is_controlled()) {
        if let Some(condition) = &controlled.condition_node_id {
            warnings.push(
                ValidationIssue::new(
                    ValidationCode::ControlledLoop,
                    format!(
                        "Loop {} is controlled by condition node '{}'",
                        controlled.cycle_path().join(" -> "),
                        condition
                    ),
                    vec![condition.clone()],
                )
                .with_context("condition_node_id", condition.clone())
                .with_context("cycle_path", controlled.cycle_path()),
            );
        }
    }

    let dangling: HashSet<NodeId> = find_dangling_nodes(definition).into_iter().collect();
    let terminal: HashSet<NodeId> = find_terminal_nodes(definition).into_iter().collect();
    for node in definition.nodes() {
        let id = node.id();
        if dangling.contains(id) {
            warnings.push(ValidationIssue::new(
                ValidationCode::DanglingNode,
                format!("Node '{}' is not connected to any other node", id),
                vec![id.to_string()],
            ));
        }
        if terminal.contains(id) {
            warnings.push(ValidationIssue::new(
                ValidationCode::NoOutgoingEdge,
                format!("Node '{}' has no outgoing edges", id),
                vec![id.to_string()],
            ));
        }
    }

    for node in definition.nodes() {
        match registry.instantiate(node) {
            Ok(instance) => {
                let field_errors = instance.validate_config();
                if field_errors.is_empty() {
                    continue;
                }
                let summary: Vec<String> = field_errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.error))
                    .collect();
                errors.push(
                    ValidationIssue::new(
                        ValidationCode::InvalidNodeConfig,
                        format!("Node '{}' has invalid configuration: {}", node.id(), summary.join("; ")),
                        vec![node.id().to_string()],
                    )
                    .with_context(
                        "field_errors",
                        serde_json::to_value(&field_errors).unwrap_or_default(),
                    ),
                );
            }
            Err(FlowError::Workflow(WorkflowError::UnknownNodeType(node_type))) => {
                errors.push(
                    ValidationIssue::new(
                        ValidationCode::UnknownNodeType,
                        format!("Node '{}' has unknown type '{}'", node.id(), node_type),
                        vec![node.id().to_string()],
                    )
                    .with_context("node_type", node_type),
                );
            }
            Err(e) => {
                errors.push(
                    ValidationIssue::new(
                        ValidationCode::InvalidNodeConfig,
                        format!("Node '{}' could not be created: {}", node.id(), e),
                        vec![node.id().to_string()],
                    )
                    .with_context("node_type", node.node_type()),
                );
            }
        }
    }

    let result = ValidationResult::new(errors, warnings);
    for error in &result.errors {
        tracing::debug!(code = %error.code, nodes = ?error.node_ids, "{}", error.message);
    }
    for warning in &result.warnings {
        tracing::debug!(code = %warning.code, nodes = ?warning.node_ids, "{}", warning.message);
    }
    result
}

/// A validated graph, ready for the executor.
///
/// Serializable so an external orchestrator can checkpoint it between
/// building and running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutablePlan {
    pub definition: WorkflowDefinition,
    pub order: Vec<NodeId>,
    pub loops: Vec<LoopInfo>,
    pub validation: ValidationResult,
    /// Forward (non back-edge) ancestors of every node
    ancestors: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl ExecutablePlan {
    pub fn has_loops(&self) -> bool {
        !self.loops.is_empty()
    }

    pub fn entry_point(&self) -> &str {
        self.definition.entry_point()
    }

    pub fn max_iterations(&self) -> u32 {
        self.definition.max_iterations()
    }

    /// Whether `ancestor` can reach `node` without taking a loop back edge.
    pub fn precedes(&self, ancestor: &str, node: &str) -> bool {
        self.ancestors
            .get(node)
            .is_some_and(|set| set.contains(ancestor))
    }

    fn new(definition: WorkflowDefinition, validation: ValidationResult) -> Result<Self, GraphError> {
        let LoopAnalysis {
            loops,
            ignorable: excluded,
        } = GraphIndex::new(&definition).analyze();
        let order = kahn_order(&definition, &excluded)?;

        let mut ancestors: BTreeMap<NodeId, BTreeSet<NodeId>> = definition
            .nodes()
            .iter()
            .map(|n| (n.id().to_string(), BTreeSet::new()))
            .collect();
        for node_id in &order {
            let inherited = ancestors.get(node_id).cloned().unwrap_or_default();
            for edge in definition
                .outgoing(node_id)
                .filter(|e| !excluded.contains(e.id()))
            {
                if let Some(set) = ancestors.get_mut(edge.target()) {
                    set.insert(node_id.clone());
                    set.extend(inherited.iter().cloned());
                }
            }
        }

        Ok(Self {
            definition,
            order,
            loops,
            validation,
            ancestors,
        })
    }
}

/// Validates graphs and turns them into [`ExecutablePlan`]s.
#[derive(Clone)]
pub struct GraphBuilder {
    registry: Arc<NodeRegistry>,
    strict: bool,
}

impl GraphBuilder {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            strict: false,
        }
    }

    /// In strict mode warnings also block plan building.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn validate(&self, definition: &WorkflowDefinition) -> ValidationResult {
        validate(definition, &self.registry)
    }

    pub fn build_executable_plan(
        &self,
        definition: &WorkflowDefinition,
    ) -> Result<ExecutablePlan, GraphError> {
        let validation = self.validate(definition);
        if !validation.valid || (self.strict && validation.has_warnings()) {
            tracing::warn!(
                workflow = definition.name(),
                errors = validation.errors.len(),
                warnings = validation.warnings.len(),
                strict = self.strict,
                "Workflow validation failed"
            );
            return Err(GraphError::ValidationFailed(validation));
        }
        ExecutablePlan::new(definition.clone(), validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> WorkflowDefinition {
        WorkflowDefinition::builder("ring")
            .node("A", "data_processor")
            .node("B", "data_processor")
            .node("C", "data_processor")
            .edge("A", "B")
            .edge("B", "C")
            .edge("C", "A")
            .build()
            .unwrap()
    }

    #[test]
    fn cycle_path_is_closed() {
        let cycle = detect_cycle(&ring()).unwrap();
        assert_eq!(cycle.nodes, vec!["A", "B", "C"]);
        assert_eq!(cycle.cycle_path(), vec!["A", "B", "C", "A"]);
        assert_eq!(cycle.back_edge, "e3");
    }

    #[test]
    fn walk_starts_at_entry_point() {
        let definition = ring().with_entry_point("B").unwrap();
        let cycle = detect_cycle(&definition).unwrap();
        assert_eq!(cycle.cycle_path(), vec!["B", "C", "A", "B"]);
    }

    #[test]
    fn two_condition_members_do_not_control_a_loop() {
        let definition = WorkflowDefinition::builder("double")
            .node("start", "data_source")
            .node("first", "condition")
            .node("second", "condition")
            .node("end", "output")
            .edge("start", "first")
            .edge("first", "second")
            .edge("second", "first")
            .edge("second", "end")
            .build()
            .unwrap();

        let loops = detect_loops(&definition);
        assert_eq!(loops.len(), 1);
        assert!(!loops[0].has_condition_exit);
        assert_eq!(loops[0].condition_node_id, None);
    }
}
