use crate::condition::ConditionEvaluator;
use crate::error::GraphError;
use crate::executor::{ExecutionResult, ExecutorConfig, RunStatus, WorkflowExecutor};
use crate::graph::{ExecutablePlan, GraphBuilder};
use crate::registry::NodeRegistry;
use loomcore::{
    EventBus, EventSink, FlowError, RunEvent, RunId, ValidationResult, Value, WorkflowDefinition,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Main runtime for validating and executing workflows
pub struct FlowRuntime {
    registry: Arc<NodeRegistry>,
    builder: GraphBuilder,
    executor: Arc<WorkflowExecutor>,
    event_bus: Arc<EventBus>,
    config: RuntimeConfig,
}

impl FlowRuntime {
    /// Create a runtime backed by the process-wide registry, or an empty one
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let registry = NodeRegistry::global().unwrap_or_else(|| Arc::new(NodeRegistry::new()));
        Self::with_registry(registry, config)
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        let builder = GraphBuilder::new(registry.clone()).strict(config.strict_validation);
        let executor = Arc::new(WorkflowExecutor::with_config(
            registry.clone(),
            config.executor_config(),
        ));
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        tracing::debug!(
            node_types = registry.len(),
            max_parallel_nodes = config.max_parallel_nodes,
            strict_validation = config.strict_validation,
            "Flow runtime initialized"
        );

        Self {
            registry,
            builder,
            executor,
            event_bus,
            config,
        }
    }

    /// Use a custom edge condition evaluator
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        self.executor = Arc::new(
            WorkflowExecutor::with_config(self.registry.clone(), self.config.executor_config())
                .with_evaluator(evaluator),
        );
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn builder(&self) -> &GraphBuilder {
        &self.builder
    }

    /// Validate without executing anything
    pub fn validate(&self, workflow: &WorkflowDefinition) -> ValidationResult {
        self.builder.validate(workflow)
    }

    pub fn build_executable_plan(
        &self,
        workflow: &WorkflowDefinition,
    ) -> Result<ExecutablePlan, GraphError> {
        self.builder.build_executable_plan(workflow)
    }

    /// Execute a workflow, publishing its events on the runtime's bus
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        inputs: HashMap<String, Value>,
    ) -> ExecutionResult {
        let cancellation = CancellationToken::new();
        self.execute_with(
            workflow,
            inputs,
            Uuid::new_v4(),
            self.event_bus.as_ref(),
            &cancellation,
        )
        .await
    }

    /// Build and execute with a caller-chosen run id, sink and cancellation token.
    ///
    /// A graph that fails to build yields a failed result carrying its
    /// validation findings; no events are emitted for it.
    pub async fn execute_with(
        &self,
        workflow: &WorkflowDefinition,
        inputs: HashMap<String, Value>,
        run_id: RunId,
        sink: &dyn EventSink,
        cancellation: &CancellationToken,
    ) -> ExecutionResult {
        match self.builder.build_executable_plan(workflow) {
            Ok(plan) => {
                self.executor
                    .execute_dynamic_workflow(&plan, inputs, run_id, sink, cancellation)
                    .await
            }
            Err(e) => {
                tracing::error!(%run_id, workflow = workflow.name(), "Workflow build failed: {}", e);
                ExecutionResult::build_failed(run_id, e)
            }
        }
    }

    /// Execute an already built plan
    pub async fn execute_plan(
        &self,
        plan: &ExecutablePlan,
        inputs: HashMap<String, Value>,
        run_id: RunId,
    ) -> ExecutionResult {
        let cancellation = CancellationToken::new();
        self.executor
            .execute_dynamic_workflow(plan, inputs, run_id, self.event_bus.as_ref(), &cancellation)
            .await
    }

    /// Start a run in the background
    pub fn spawn(&self, workflow: WorkflowDefinition, inputs: HashMap<String, Value>) -> ExecutionHandle {
        let run_id = Uuid::new_v4();
        let (status_tx, status_rx) = watch::channel(RunStatus::Pending);
        let cancellation = CancellationToken::new();

        let builder = self.builder.clone();
        let executor = self.executor.clone();
        let event_bus = self.event_bus.clone();
        let token = cancellation.clone();

        let task = tokio::spawn(async move {
            let plan = match builder.build_executable_plan(&workflow) {
                Ok(plan) => plan,
                Err(e) => {
                    tracing::error!(%run_id, workflow = workflow.name(), "Workflow build failed: {}", e);
                    let result = ExecutionResult::build_failed(run_id, e);
                    status_tx.send_replace(result.status);
                    return result;
                }
            };

            status_tx.send_replace(RunStatus::Running);
            let result = executor
                .execute_dynamic_workflow(&plan, inputs, run_id, event_bus.as_ref(), &token)
                .await;
            status_tx.send_replace(result.status);
            result
        });

        ExecutionHandle {
            run_id,
            status: status_rx,
            cancellation,
            task,
        }
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> broadcast::Receiver<RunEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for monitoring and cancelling a spawned run
pub struct ExecutionHandle {
    pub run_id: RunId,
    status: watch::Receiver<RunStatus>,
    cancellation: CancellationToken,
    task: JoinHandle<ExecutionResult>,
}

impl ExecutionHandle {
    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    /// Watch channel that follows the run's status transitions
    pub fn status_receiver(&self) -> watch::Receiver<RunStatus> {
        self.status.clone()
    }

    /// Ask the run to stop before its next node dispatch
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub async fn join(self) -> Result<ExecutionResult, FlowError> {
        self.task
            .await
            .map_err(|e| FlowError::Execution(format!("run {} panicked: {}", self.run_id, e)))
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub max_parallel_nodes: usize,
    pub event_buffer_size: usize,
    /// Reject graphs with warnings as well as errors
    pub strict_validation: bool,
    pub node_timeout_ms: Option<u64>,
}

impl RuntimeConfig {
    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_parallel_nodes: self.max_parallel_nodes,
            node_timeout: self.node_timeout_ms.map(Duration::from_millis),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 10,
            event_buffer_size: 1000,
            strict_validation: false,
            node_timeout_ms: None,
        }
    }
}
