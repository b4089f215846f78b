use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use loomcore::{ExecutionEvent, RunEvent, ValidationResult, Value, WorkflowDefinition};
use loomruntime::{ExecutionResult, FlowRuntime, NodeRegistry, RunStatus, RuntimeConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loom")]
#[command(about = "Loom workflow engine CLI", long_about = None)]
struct Cli {
    /// Show debug logs (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Runtime configuration JSON file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Initial state as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Override the workflow's max_iterations
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,

        /// Print the validation result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run {
            file,
            input,
            max_iterations,
        } => {
            let runtime = build_runtime(config)?;
            run_workflow(runtime, &file, input, max_iterations).await?;
        }

        Commands::Validate { file, json } => {
            let runtime = build_runtime(config)?;
            validate_workflow(&runtime, &file, json)?;
        }

        Commands::Nodes => {
            let runtime = build_runtime(config)?;
            list_nodes(runtime.registry());
        }

        Commands::Init { output } => {
            create_example_workflow(&output)?;
        }
    }

    Ok(())
}

fn build_runtime(config_path: Option<&Path>) -> Result<FlowRuntime> {
    let config = match config_path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RuntimeConfig::default(),
    };

    loomnodes::standard_registry()?.install_global()?;
    Ok(FlowRuntime::with_config(config))
}

fn load_workflow(file: &Path) -> Result<WorkflowDefinition> {
    let workflow_json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let workflow: WorkflowDefinition = serde_json::from_str(&workflow_json)
        .with_context(|| format!("{} is not a valid workflow", file.display()))?;
    Ok(workflow)
}

/// Parse `--input` into the run's initial state
fn parse_input(input: Option<String>) -> Result<HashMap<String, Value>> {
    let Some(input_str) = input else {
        return Ok(HashMap::new());
    };
    match Value::from(serde_json::from_str::<serde_json::Value>(&input_str)?) {
        Value::Object(map) => Ok(map),
        _ => bail!("Input must be a JSON object"),
    }
}

async fn run_workflow(
    runtime: FlowRuntime,
    file: &Path,
    input: Option<String>,
    max_iterations: Option<u32>,
) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());

    let mut workflow = load_workflow(file)?;
    if let Some(max_iterations) = max_iterations {
        workflow = workflow.with_max_iterations(max_iterations)?;
    }
    let inputs = parse_input(input)?;

    println!("📋 Workflow: {}", workflow.name());
    println!("   Nodes: {}", workflow.nodes().len());
    println!("   Edges: {}", workflow.edges().len());
    println!("   Entry point: {}", workflow.entry_point());
    println!();

    // Print events as they arrive; the task ends once the runtime is dropped
    let events = runtime.subscribe_events();
    let event_task = tokio::spawn(print_events(events));

    let result = runtime.execute(&workflow, inputs).await;
    drop(runtime);
    event_task.await?;

    print_summary(&result);

    match result.status {
        RunStatus::Completed | RunStatus::LoopTerminated => Ok(()),
        status => bail!(
            "workflow ended as {:?}: {}",
            status,
            result.error.as_deref().unwrap_or("no error reported")
        ),
    }
}

async fn print_events(mut events: broadcast::Receiver<RunEvent>) {
    loop {
        let RunEvent { event, .. } = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event printer lagged behind");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            ExecutionEvent::WorkflowStart {
                entry_point,
                has_loops,
                max_iterations,
                ..
            } => {
                println!(
                    "▶️  Workflow started at {} (loops: {}, max iterations: {})",
                    entry_point, has_loops, max_iterations
                );
            }
            ExecutionEvent::LoopIteration { node_id, iteration, .. } => {
                println!("  🔁 {} iteration {}", node_id, iteration);
            }
            ExecutionEvent::LoopTerminated {
                node_id,
                count,
                max_iterations,
                ..
            } => {
                println!(
                    "  ⛔ Loop stopped at {} after {}/{} executions",
                    node_id, count, max_iterations
                );
            }
            ExecutionEvent::WorkflowComplete {
                loop_terminated,
                duration_ms,
                ..
            } => {
                if loop_terminated {
                    println!("✨ Workflow completed in {}ms (loop terminated)", duration_ms);
                } else {
                    println!("✨ Workflow completed successfully in {}ms", duration_ms);
                }
            }
        }
    }
}

fn print_summary(result: &ExecutionResult) {
    println!();
    println!("📊 Execution Summary:");
    println!("   Run ID: {}", result.run_id);
    println!("   Status: {:?}", result.status);
    for (node_id, count) in &result.node_execution_counts {
        println!("   {}: executed {}x", node_id, count);
    }
    if let Some(error) = &result.error {
        println!("   ❌ {}", error);
    }
    if let Some(validation) = &result.validation {
        print_findings(validation);
    }

    let mut node_ids: Vec<&String> = result.outputs.keys().collect();
    node_ids.sort();
    if !node_ids.is_empty() {
        println!();
        println!("📤 Outputs:");
        for node_id in node_ids {
            let outputs = &result.outputs[node_id];
            match serde_json::to_string(outputs) {
                Ok(json) => println!("   {}: {}", node_id, json),
                Err(_) => println!("   {}: {:?}", node_id, outputs),
            }
        }
    }
}

fn validate_workflow(runtime: &FlowRuntime, file: &Path, json: bool) -> Result<()> {
    let workflow = load_workflow(file)?;
    let result = runtime.validate(&workflow);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("🔍 Validating workflow: {}", file.display());
        println!("   Name: {}", workflow.name());
        println!("   Nodes: {}", workflow.nodes().len());
        println!("   Edges: {}", workflow.edges().len());
        print_findings(&result);
        if result.valid {
            println!("✅ Workflow is valid");
        }
    }

    if !result.valid {
        bail!("workflow has {} validation error(s)", result.errors.len());
    }
    Ok(())
}

fn print_findings(result: &ValidationResult) {
    for error in &result.errors {
        println!("   ❌ {} {}: {}", error.code, error.node_ids.join(","), error.message);
    }
    for warning in &result.warnings {
        println!("   ⚠️  {} {}: {}", warning.code, warning.node_ids.join(","), warning.message);
    }
}

fn list_nodes(registry: &NodeRegistry) {
    println!("📦 Available Node Types:");
    println!();

    for definition in registry.list() {
        println!("  • {} ({})", definition.node_type, definition.category);
        if !definition.description.is_empty() {
            println!("    {}", definition.description);
        }
    }
}

fn create_example_workflow(output: &Path) -> Result<()> {
    let config = |pairs: &[(&str, Value)]| -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    };

    let workflow = WorkflowDefinition::builder("Example counter loop")
        .node_with_config("start", "data_source", config(&[("state_key", Value::from("count"))]))
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
                ("value", Value::from(5.0)),
            ]),
        )
        .node("done", "output")
        .edge("start", "increment")
        .edge("increment", "check")
        .conditional_edge("check", "increment", "false")
        .conditional_edge("check", "done", "true")
        .max_iterations(10)
        .build()?;

    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  loom run --file {} --input '{{\"count\": 0}}'", output.display());
    println!("  loom run --file {} --input '{{\"count\": 0}}' --max-iterations 3", output.display());

    Ok(())
}
