use crate::condition::{ConditionEvaluator, ConditionState, VerdictEvaluator};
use crate::error::{ExecutionError, GraphError};
use crate::graph::ExecutablePlan;
use crate::registry::NodeRegistry;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use loomcore::{
    EventSink, ExecutionEvent, Node, NodeContext, NodeError, NodeId, NodeInputs, NodeOutput,
    RunId, ValidationResult, Value, CONDITION_NODE_TYPE,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one run: `pending → running → {completed | failed | loop_terminated | cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    LoopTerminated,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Pending | RunStatus::Running)
    }
}

/// Raised internally when a node is about to run more often than the
/// workflow allows. Converted into a graceful loop termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaxIterationsExceeded {
    pub node_id: NodeId,
    pub count: u32,
    pub max_iterations: u32,
}

/// Result of workflow execution
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub run_id: RunId,
    pub status: RunStatus,
    /// True for completed runs, including ones stopped by the loop safety valve
    pub success: bool,
    pub loop_terminated: bool,
    pub terminated_node: Option<NodeId>,
    /// Latest outputs of every node that ran
    pub outputs: HashMap<NodeId, HashMap<String, Value>>,
    pub node_execution_counts: BTreeMap<NodeId, u32>,
    pub duration_ms: u64,
    pub error: Option<String>,
    /// Findings of a failed build, when that is why the run failed
    pub validation: Option<ValidationResult>,
}

impl ExecutionResult {
    pub fn execution_count(&self, node_id: &str) -> u32 {
        self.node_execution_counts.get(node_id).copied().unwrap_or(0)
    }

    pub fn output(&self, node_id: &str, key: &str) -> Option<&Value> {
        self.outputs.get(node_id).and_then(|outputs| outputs.get(key))
    }

    /// A run that never started because its plan could not be built.
    pub fn build_failed(run_id: RunId, error: GraphError) -> Self {
        Self {
            run_id,
            status: RunStatus::Failed,
            success: false,
            loop_terminated: false,
            terminated_node: None,
            outputs: HashMap::new(),
            node_execution_counts: BTreeMap::new(),
            duration_ms: 0,
            error: Some(error.to_string()),
            validation: error.validation().cloned(),
        }
    }
}

/// Configuration for the executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub max_parallel_nodes: usize,
    pub node_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 10,
            node_timeout: None,
        }
    }
}

type TaskResult = (NodeId, Result<NodeOutput, NodeError>, u64);

enum Stop {
    LoopTerminated(MaxIterationsExceeded),
    Cancelled,
}

#[derive(Default)]
struct RunState {
    counts: BTreeMap<NodeId, u32>,
    outputs: HashMap<NodeId, HashMap<String, Value>>,
}

/// Runs executable plans, honouring controlled loops and the iteration cap
pub struct WorkflowExecutor {
    registry: Arc<NodeRegistry>,
    evaluator: Arc<dyn ConditionEvaluator>,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self::with_config(registry, ExecutorConfig::default())
    }

    pub fn with_config(registry: Arc<NodeRegistry>, config: ExecutorConfig) -> Self {
        Self {
            registry,
            evaluator: Arc::new(VerdictEvaluator),
            config,
        }
    }

    /// Replace the edge condition evaluator
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute a built plan.
    ///
    /// Never returns an error: internal failures end the run as
    /// [`RunStatus::Failed`] with the message preserved, and hitting the
    /// iteration cap ends it as a successful [`RunStatus::LoopTerminated`].
    pub async fn execute_dynamic_workflow(
        &self,
        plan: &ExecutablePlan,
        initial_state: HashMap<String, Value>,
        run_id: RunId,
        sink: &dyn EventSink,
        cancellation: &CancellationToken,
    ) -> ExecutionResult {
        let start_time = Instant::now();
        let mut run = RunState::default();

        tracing::info!(%run_id, workflow = plan.definition.name(), "Starting workflow execution");

        let outcome = self
            .drive(plan, initial_state, run_id, sink, cancellation, &mut run)
            .await;
        let duration_ms = start_time.elapsed().as_millis() as u64;

        let (status, terminated_node, error) = match outcome {
            Ok(None) => (RunStatus::Completed, None, None),
            Ok(Some(Stop::LoopTerminated(signal))) => {
                tracing::warn!(
                    %run_id,
                    node_id = %signal.node_id,
                    count = signal.count,
                    max_iterations = signal.max_iterations,
                    "Loop terminated at max iterations"
                );
                sink.emit(
                    run_id,
                    &ExecutionEvent::LoopTerminated {
                        node_id: signal.node_id.clone(),
                        count: signal.count,
                        max_iterations: signal.max_iterations,
                        timestamp: Utc::now(),
                    },
                );
                (RunStatus::LoopTerminated, Some(signal.node_id), None)
            }
            Ok(Some(Stop::Cancelled)) => {
                tracing::info!(%run_id, "Workflow execution cancelled");
                (RunStatus::Cancelled, None, None)
            }
            Err(e) => {
                tracing::error!(%run_id, "Workflow execution failed: {}", e);
                (RunStatus::Failed, None, Some(e.to_string()))
            }
        };

        let success = matches!(status, RunStatus::Completed | RunStatus::LoopTerminated);
        let loop_terminated = status == RunStatus::LoopTerminated;
        if success {
            sink.emit(
                run_id,
                &ExecutionEvent::WorkflowComplete {
                    success,
                    loop_terminated,
                    node_execution_counts: run.counts.clone(),
                    duration_ms,
                    timestamp: Utc::now(),
                },
            );
            tracing::info!(%run_id, duration_ms, loop_terminated, "Workflow completed");
        }

        ExecutionResult {
            run_id,
            status,
            success,
            loop_terminated,
            terminated_node,
            outputs: run.outputs,
            node_execution_counts: run.counts,
            duration_ms,
            error,
            validation: None,
        }
    }

    async fn drive(
        &self,
        plan: &ExecutablePlan,
        initial_state: HashMap<String, Value>,
        run_id: RunId,
        sink: &dyn EventSink,
        cancellation: &CancellationToken,
        run: &mut RunState,
    ) -> Result<Option<Stop>, ExecutionError> {
        let definition = &plan.definition;
        let max_iterations = definition.max_iterations();
        let max_parallel = self.config.max_parallel_nodes.max(1);

        // Create node instances
        let mut instances: HashMap<&str, Arc<dyn Node>> = HashMap::new();
        for node in definition.nodes() {
            let instance = self
                .registry
                .instantiate(node)
                .map_err(|e| ExecutionError::Instantiate {
                    node_id: node.id().to_string(),
                    message: e.to_string(),
                })?;
            instances.insert(node.id(), Arc::from(instance));
        }

        sink.emit(
            run_id,
            &ExecutionEvent::WorkflowStart {
                workflow_name: definition.name().to_string(),
                entry_point: definition.entry_point().to_string(),
                node_count: definition.nodes().len(),
                has_loops: plan.has_loops(),
                max_iterations,
                timestamp: Utc::now(),
            },
        );

        let initial = Arc::new(initial_state);
        let mut pending: Vec<NodeId> = vec![definition.entry_point().to_string()];
        let mut running: HashSet<NodeId> = HashSet::new();
        let mut in_flight: FuturesUnordered<JoinHandle<TaskResult>> = FuturesUnordered::new();
        let mut stop: Option<Stop> = None;
        let mut failure: Option<ExecutionError> = None;

        loop {
            if stop.is_none() && cancellation.is_cancelled() {
                stop = Some(Stop::Cancelled);
            }

            // Dispatch every ready node, up to the parallel limit
            while stop.is_none() && in_flight.len() < max_parallel {
                let Some(position) = pending
                    .iter()
                    .position(|id| is_ready(plan, id, &pending, &running))
                else {
                    break;
                };

                let node_id = pending[position].clone();
                let count = run.counts.get(&node_id).copied().unwrap_or(0);
                if count >= max_iterations {
                    stop = Some(Stop::LoopTerminated(MaxIterationsExceeded {
                        node_id,
                        count,
                        max_iterations,
                    }));
                    break;
                }

                pending.remove(position);
                let iteration = count + 1;
                run.counts.insert(node_id.clone(), iteration);
                if iteration > 1 {
                    sink.emit(
                        run_id,
                        &ExecutionEvent::LoopIteration {
                            node_id: node_id.clone(),
                            iteration,
                            timestamp: Utc::now(),
                        },
                    );
                }

                let node = instances
                    .get(node_id.as_str())
                    .cloned()
                    .ok_or_else(|| ExecutionError::Internal(format!("no instance for node {}", node_id)))?;
                let ctx = NodeContext {
                    run_id,
                    node_id: node_id.clone(),
                    iteration,
                    inputs: collect_node_inputs(plan, &node_id, &run.outputs),
                    initial: initial.clone(),
                    cancellation: cancellation.child_token(),
                };

                tracing::debug!(%run_id, node_id = %node_id, iteration, "Dispatching node");
                running.insert(node_id.clone());
                in_flight.push(tokio::spawn(run_node(node, ctx, self.config.node_timeout)));
            }

            // If nothing is running, we're done
            if in_flight.is_empty() {
                break;
            }

            // Wait for next task to complete
            let Some(joined) = in_flight.next().await else {
                break;
            };
            let (node_id, exec_result, duration_ms) = match joined {
                Ok(result) => result,
                Err(e) => {
                    failure = Some(ExecutionError::Internal(format!("Task join error: {}", e)));
                    break;
                }
            };
            running.remove(&node_id);

            match exec_result {
                Ok(output) => {
                    tracing::info!(%run_id, node_id = %node_id, duration_ms, "Node completed");
                    if stop.is_none() {
                        match self.eligible_targets(plan, &node_id, &output, &run.counts) {
                            Ok(targets) => {
                                for target in targets {
                                    if !pending.contains(&target) {
                                        pending.push(target);
                                    }
                                }
                            }
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        }
                    }
                    run.outputs.insert(node_id, output.outputs);
                }
                // A node honoring its cancelled token is part of the shutdown, not a failure
                Err(NodeError::Cancelled) if cancellation.is_cancelled() => {
                    tracing::info!(%run_id, node_id = %node_id, duration_ms, "Node cancelled");
                    stop = Some(Stop::Cancelled);
                }
                Err(e) => {
                    tracing::error!(%run_id, node_id = %node_id, "Node failed: {}", e);
                    failure = Some(ExecutionError::Node { node_id, source: e });
                    break;
                }
            }
        }

        if let Some(e) = failure {
            for handle in in_flight.iter() {
                handle.abort();
            }
            return Err(e);
        }

        Ok(stop)
    }

    /// Targets of the outgoing edges this node's result allows.
    fn eligible_targets(
        &self,
        plan: &ExecutablePlan,
        node_id: &str,
        output: &NodeOutput,
        counts: &BTreeMap<NodeId, u32>,
    ) -> Result<Vec<NodeId>, ExecutionError> {
        let node_type = plan
            .definition
            .find_node(node_id)
            .map(|n| n.node_type())
            .unwrap_or_default();
        let verdict = output.verdict();
        if node_type == CONDITION_NODE_TYPE && verdict.is_none() {
            return Err(ExecutionError::MissingVerdict(node_id.to_string()));
        }

        let state = ConditionState {
            node_id,
            node_type,
            verdict,
            outputs: &output.outputs,
            iteration: counts.get(node_id).copied().unwrap_or(0),
        };

        let mut targets = Vec::new();
        for edge in plan.definition.outgoing(node_id) {
            let take = match edge.condition() {
                None => true,
                Some(expression) => self.evaluator.evaluate(expression, &state).map_err(|source| {
                    ExecutionError::Condition {
                        edge_id: edge.id().to_string(),
                        source,
                    }
                })?,
            };
            if take {
                targets.push(edge.target().to_string());
            }
        }
        Ok(targets)
    }
}

async fn run_node(node: Arc<dyn Node>, ctx: NodeContext, node_timeout: Option<Duration>) -> TaskResult {
    let node_id = ctx.node_id.clone();
    let start = Instant::now();
    let result = match node_timeout {
        Some(limit) => match tokio::time::timeout(limit, node.execute(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(NodeError::Timeout {
                millis: limit.as_millis() as u64,
            }),
        },
        None => node.execute(ctx).await,
    };
    (node_id, result, start.elapsed().as_millis() as u64)
}

/// A pending node may start once it is not already running and nothing
/// still pending or running can reach it through forward edges.
fn is_ready(plan: &ExecutablePlan, node_id: &str, pending: &[NodeId], running: &HashSet<NodeId>) -> bool {
    !running.contains(node_id)
        && !pending
            .iter()
            .chain(running.iter())
            .any(|other| other != node_id && plan.precedes(other, node_id))
}

/// Latest outputs of every direct predecessor that has produced any.
fn collect_node_inputs(
    plan: &ExecutablePlan,
    node_id: &str,
    node_outputs: &HashMap<NodeId, HashMap<String, Value>>,
) -> NodeInputs {
    let mut inputs = NodeInputs::new();
    for edge in plan.definition.incoming(node_id) {
        if let Some(outputs) = node_outputs.get(edge.source()) {
            inputs.insert(edge.source().to_string(), outputs.clone());
        }
    }
    inputs
}
