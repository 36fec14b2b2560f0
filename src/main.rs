use std::collections::HashMap;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use sluice_engine::{
  ChannelNotifier, ControllerConfig, MissingToolPolicy, RunController, RunError, RunEvent,
  RunNotifier, suggest_next,
};
use sluice_store::{JsonFileBackend, WorkflowStore};
use sluice_tool::{InMemoryToolRegistry, ToolDescriptor, ToolRegistry, builtin_registry};
use sluice_workflow::{
  StepPatch, StepSeed, Workflow, WorkflowPatch, builtin_templates, export_to_string, find_template,
  import_from_str,
};

type Store = WorkflowStore<JsonFileBackend>;

/// Sluice - build and run pipelines of text and data tools
#[derive(Parser)]
#[command(name = "sluice")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.sluice)
  #[arg(long, global = true, env = "SLUICE_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// What a run does with a step whose tool is not available
  #[arg(long, global = true, value_enum, default_value_t = MissingTool::PassThrough)]
  missing_tool: MissingTool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum MissingTool {
  /// Pass the step's input through unchanged
  PassThrough,
  /// Fail the step and halt the run
  Fail,
}

impl From<MissingTool> for MissingToolPolicy {
  fn from(value: MissingTool) -> Self {
    match value {
      MissingTool::PassThrough => MissingToolPolicy::PassThrough,
      MissingTool::Fail => MissingToolPolicy::Fail,
    }
  }
}

#[derive(Subcommand)]
enum Commands {
  /// List the available tools
  Tools,

  /// List the built-in workflow templates
  Templates,

  /// Manage workflows
  Workflow {
    #[command(subcommand)]
    action: WorkflowAction,
  },

  /// Edit the steps of a workflow
  Step {
    #[command(subcommand)]
    action: StepAction,
  },

  /// Run every step of a workflow
  Run {
    /// Workflow id
    workflow: String,

    /// Initial input (default: read from stdin)
    #[arg(long)]
    input: Option<String>,

    /// Parse the initial input as JSON instead of passing it as text
    #[arg(long)]
    json: bool,
  },

  /// Suggest tools that can follow the last step of a workflow
  Suggest {
    /// Workflow id
    workflow: String,
  },

  /// Export a workflow as a shareable JSON document
  Export {
    /// Workflow id
    workflow: String,

    /// Write to a file instead of stdout
    #[arg(long, short)]
    out: Option<PathBuf>,
  },

  /// Import a workflow from a JSON document ("-" reads stdin)
  Import {
    /// Path to the document
    file: PathBuf,
  },
}

#[derive(Subcommand)]
enum WorkflowAction {
  /// List workflows, favorites first
  List,

  /// Create a workflow
  Create {
    name: String,

    /// Start from a built-in template
    #[arg(long)]
    template: Option<String>,
  },

  /// Show a workflow and its steps
  Show { workflow: String },

  /// Rename a workflow
  Rename { workflow: String, name: String },

  /// Set the description of a workflow (omit to clear it)
  Describe {
    workflow: String,
    description: Option<String>,
  },

  /// Delete a workflow
  Delete { workflow: String },

  /// Create a copy of a workflow
  Duplicate { workflow: String },

  /// Toggle the favorite flag of a workflow
  Favorite { workflow: String },
}

/// Steps are addressed by id or by 1-based position.
#[derive(Subcommand)]
enum StepAction {
  /// Append a step
  Add {
    workflow: String,
    tool: String,

    /// Tool options as a JSON object
    #[arg(long)]
    options: Option<String>,

    /// Add the step disabled
    #[arg(long)]
    disabled: bool,
  },

  /// Change a step's tool, options or enabled flag
  Update {
    workflow: String,
    step: String,

    #[arg(long)]
    tool: Option<String>,

    /// Replace the tool options (JSON object)
    #[arg(long)]
    options: Option<String>,

    #[arg(long, conflicts_with = "enable")]
    disable: bool,

    #[arg(long)]
    enable: bool,
  },

  /// Remove a step
  Remove { workflow: String, step: String },

  /// Move a step to a new 1-based position
  Move {
    workflow: String,
    step: String,
    to: usize,
  },

  /// Insert a copy of a step right after it
  Duplicate { workflow: String, step: String },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_writer(io::stderr)
    .init();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".sluice"),
  };
  let config = ControllerConfig {
    missing_tool: cli.missing_tool.into(),
  };

  let Some(command) = cli.command else {
    println!("sluice - use --help to see available commands");
    return Ok(());
  };

  debug!(data_dir = %data_dir.display(), missing_tool = ?config.missing_tool, "starting");

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let store = WorkflowStore::new(JsonFileBackend::in_dir(&data_dir));
    let registry = builtin_registry();
    dispatch(command, &store, registry, config).await
  })
}

async fn dispatch(
  command: Commands,
  store: &Store,
  registry: InMemoryToolRegistry,
  config: ControllerConfig,
) -> Result<()> {
  match command {
    Commands::Tools => {
      for tool in registry.list() {
        print_tool(&tool);
      }
    }
    Commands::Templates => {
      for template in builtin_templates() {
        let tools: Vec<_> = template.tool_ids().collect();
        println!("{:<16} {}", template.id, template.name);
        println!("{:<16} {}", "", template.description);
        println!("{:<16} {}", "", tools.join(" -> "));
      }
    }
    Commands::Workflow { action } => workflow_command(action, store).await?,
    Commands::Step { action } => step_command(action, store).await?,
    Commands::Run {
      workflow,
      input,
      json,
    } => {
      let workflow = store.get_workflow(&workflow).await?;
      let input = read_input(input, json)?;
      run_workflow(&workflow, input, registry, config).await?;
    }
    Commands::Suggest { workflow } => {
      let workflow = store.get_workflow(&workflow).await?;
      let suggestions = suggest_next(&workflow, &registry);
      if suggestions.is_empty() {
        eprintln!("No suggestions for workflow '{}'", workflow.name);
      }
      for tool in suggestions {
        print_tool(&tool);
      }
    }
    Commands::Export { workflow, out } => {
      let workflow = store.get_workflow(&workflow).await?;
      let document = export_to_string(&workflow)?;
      match out {
        Some(path) => {
          tokio::fs::write(&path, document)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
          eprintln!("Exported '{}' to {}", workflow.name, path.display());
        }
        None => println!("{document}"),
      }
    }
    Commands::Import { file } => {
      let text = if file.as_os_str() == "-" {
        read_stdin()?
      } else {
        tokio::fs::read_to_string(&file)
          .await
          .with_context(|| format!("failed to read {}", file.display()))?
      };
      let workflow = import_from_str(&text)
        .with_context(|| format!("failed to import {}", file.display()))?;
      let name = workflow.name.clone();
      let id = store.insert_workflow(workflow).await?;
      eprintln!("Imported '{name}'");
      println!("{id}");
    }
  }

  Ok(())
}

async fn workflow_command(action: WorkflowAction, store: &Store) -> Result<()> {
  match action {
    WorkflowAction::List => {
      for workflow in store.list_workflows().await? {
        let marker = if workflow.is_favorite { "*" } else { " " };
        println!(
          "{marker} {}  {:<24} {} steps  updated {}",
          workflow.id,
          workflow.name,
          workflow.steps.len(),
          workflow.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
      }
    }
    WorkflowAction::Create { name, template } => {
      let steps = match template {
        Some(id) => find_template(&id)
          .with_context(|| format!("unknown template '{id}'"))?
          .instantiate(),
        None => Vec::new(),
      };
      let id = store.create_workflow(&name, steps).await?;
      println!("{id}");
    }
    WorkflowAction::Show { workflow } => {
      print_workflow(&store.get_workflow(&workflow).await?);
    }
    WorkflowAction::Rename { workflow, name } => {
      store
        .update_workflow(&workflow, WorkflowPatch::rename(name))
        .await?;
    }
    WorkflowAction::Describe {
      workflow,
      description,
    } => {
      let patch = WorkflowPatch {
        description: Some(description),
        ..WorkflowPatch::default()
      };
      store.update_workflow(&workflow, patch).await?;
    }
    WorkflowAction::Delete { workflow } => {
      store.delete_workflow(&workflow).await?;
    }
    WorkflowAction::Duplicate { workflow } => {
      println!("{}", store.duplicate_workflow(&workflow).await?);
    }
    WorkflowAction::Favorite { workflow } => {
      let workflow = store.toggle_favorite(&workflow).await?;
      let state = if workflow.is_favorite { "added to" } else { "removed from" };
      eprintln!("'{}' {state} favorites", workflow.name);
    }
  }

  Ok(())
}

async fn step_command(action: StepAction, store: &Store) -> Result<()> {
  let updated = match action {
    StepAction::Add {
      workflow,
      tool,
      options,
      disabled,
    } => {
      let mut seed = StepSeed::new(tool).disabled(disabled);
      if let Some(options) = options {
        seed = seed.with_options(parse_options(&options)?);
      }
      store.add_step(&workflow, seed).await?
    }
    StepAction::Update {
      workflow,
      step,
      tool,
      options,
      disable,
      enable,
    } => {
      let step_id = resolve_step(store, &workflow, &step).await?;
      let patch = StepPatch {
        tool_id: tool,
        options: options.as_deref().map(parse_options).transpose()?,
        disabled: match (disable, enable) {
          (true, _) => Some(true),
          (_, true) => Some(false),
          _ => None,
        },
      };
      store.update_step(&workflow, &step_id, patch).await?
    }
    StepAction::Remove { workflow, step } => {
      let step_id = resolve_step(store, &workflow, &step).await?;
      store.remove_step(&workflow, &step_id).await?
    }
    StepAction::Move { workflow, step, to } => {
      let step_id = resolve_step(store, &workflow, &step).await?;
      store
        .move_step(&workflow, &step_id, to.saturating_sub(1))
        .await?
    }
    StepAction::Duplicate { workflow, step } => {
      let step_id = resolve_step(store, &workflow, &step).await?;
      store.duplicate_step(&workflow, &step_id).await?
    }
  };

  print_workflow(&updated);
  Ok(())
}

async fn run_workflow(
  workflow: &Workflow,
  input: Value,
  registry: InMemoryToolRegistry,
  config: ControllerConfig,
) -> Result<()> {
  let (notifier, events) = ChannelNotifier::channel();
  let controller = RunController::with_notifier(registry, config, notifier);

  let labels = workflow
    .steps
    .iter()
    .enumerate()
    .map(|(i, step)| {
      let label = format!("[{}/{}] {}", i + 1, workflow.steps.len(), step.tool_id);
      (step.id.clone(), label)
    })
    .collect();
  let progress = tokio::spawn(print_progress(events, labels));

  let result = run_until_interrupted(&controller, workflow, input, tokio::signal::ctrl_c()).await;

  // Closes the event channel so the progress printer finishes.
  drop(controller);
  progress.await?;

  let output = result.with_context(|| format!("workflow '{}' did not complete", workflow.name))?;
  match output {
    Some(Value::String(text)) => println!("{text}"),
    Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
    None => eprintln!("Workflow '{}' has no steps", workflow.name),
  }

  Ok(())
}

/// Run the pipeline, requesting cancellation when `interrupt` resolves `Ok`.
///
/// An `Err` from `interrupt` (e.g. the signal handler could not be installed)
/// leaves the run alone.
async fn run_until_interrupted<R, N, F>(
  controller: &RunController<R, N>,
  workflow: &Workflow,
  input: Value,
  interrupt: F,
) -> Result<Option<Value>, RunError>
where
  R: ToolRegistry,
  N: RunNotifier,
  F: Future<Output = io::Result<()>>,
{
  let run = controller.run_pipeline(workflow, input);
  tokio::pin!(run);
  tokio::select! {
    result = &mut run => result,
    Ok(()) = interrupt => {
      eprintln!("Cancelling after the current step...");
      controller.cancel_run();
      run.await
    }
  }
}

async fn print_progress(mut events: UnboundedReceiver<RunEvent>, labels: HashMap<String, String>) {
  let label = |step_id: &str| labels.get(step_id).cloned().unwrap_or_else(|| step_id.to_string());

  while let Some(event) = events.recv().await {
    match event {
      RunEvent::StepStarted { step_id, .. } => eprintln!("{} running", label(&step_id)),
      RunEvent::StepSkipped { step_id, .. } => eprintln!("{} skipped (disabled)", label(&step_id)),
      RunEvent::StepCompleted {
        step_id,
        duration_ms,
        ..
      } => match duration_ms {
        Some(ms) => eprintln!("{} ok ({ms}ms)", label(&step_id)),
        None => eprintln!("{} ok", label(&step_id)),
      },
      RunEvent::StepFailed { step_id, error, .. } => {
        eprintln!("{} failed: {error}", label(&step_id))
      }
      RunEvent::RunStarted { .. } | RunEvent::RunFinished { .. } => {}
    }
  }
}

/// Accept a step id or a 1-based position.
async fn resolve_step(store: &Store, workflow_id: &str, step: &str) -> Result<String> {
  let workflow = store.get_workflow(workflow_id).await?;
  if workflow.step(step).is_some() {
    return Ok(step.to_string());
  }

  let position: usize = step
    .parse()
    .with_context(|| format!("step '{step}' not found in workflow '{}'", workflow.name))?;
  match position.checked_sub(1).and_then(|i| workflow.steps.get(i)) {
    Some(found) => Ok(found.id.clone()),
    None => bail!(
      "workflow '{}' has no step at position {position}",
      workflow.name
    ),
  }
}

fn parse_options(text: &str) -> Result<Value> {
  let options: Value = serde_json::from_str(text).context("failed to parse step options JSON")?;
  if !options.is_object() {
    bail!("step options must be a JSON object");
  }
  Ok(options)
}

fn read_input(input: Option<String>, json: bool) -> Result<Value> {
  let text = match input {
    Some(text) => text,
    None => read_stdin()?,
  };

  if json {
    serde_json::from_str(&text).context("failed to parse input JSON")
  } else {
    Ok(Value::String(text))
  }
}

fn read_stdin() -> Result<String> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, start from empty text
    return Ok(String::new());
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read from stdin")?;
  Ok(input)
}

fn print_tool(tool: &ToolDescriptor) {
  let types = |types: &Option<Vec<String>>| match types {
    Some(types) if !types.is_empty() => types.join(","),
    _ => "-".to_string(),
  };
  let runnable = if tool.process.is_some() { "" } else { "  (not runnable)" };
  println!(
    "{:<16} {:<24} {} -> {}{runnable}",
    tool.id,
    tool.name,
    types(&tool.input_types),
    types(&tool.output_types)
  );
}

fn print_workflow(workflow: &Workflow) {
  let favorite = if workflow.is_favorite { " *" } else { "" };
  println!("{}{favorite}", workflow.name);
  println!("  id: {}", workflow.id);
  if let Some(description) = &workflow.description {
    println!("  {description}");
  }
  println!(
    "  updated: {}",
    workflow.updated_at.format("%Y-%m-%d %H:%M:%S")
  );

  for (i, step) in workflow.steps.iter().enumerate() {
    let disabled = if step.disabled { " (disabled)" } else { "" };
    println!("  {}. {} [{}]{disabled}", i + 1, step.tool_id, step.id);
    if step.options.as_object().is_some_and(|o| !o.is_empty()) {
      println!("     options: {}", step.options);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use sluice_engine::RunState;

  fn shout_backwards() -> Workflow {
    Workflow::new(
      "shout",
      vec![
        StepSeed::new("text-uppercase").into_step(),
        StepSeed::new("text-reverse").into_step(),
      ],
    )
  }

  #[tokio::test]
  async fn test_failed_signal_setup_does_not_cancel() {
    let controller = RunController::new(builtin_registry());
    let interrupt = async { Err(io::Error::other("no signal handler")) };

    let output = run_until_interrupted(&controller, &shout_backwards(), json!("ab"), interrupt)
      .await
      .unwrap();

    assert_eq!(output, Some(json!("BA")));
    assert_eq!(controller.state(), RunState::Completed);
  }

  #[tokio::test]
  async fn test_pending_interrupt_lets_run_finish() {
    let controller = RunController::new(builtin_registry());
    let interrupt = std::future::pending::<io::Result<()>>();

    let output = run_until_interrupted(&controller, &shout_backwards(), json!("ab"), interrupt)
      .await
      .unwrap();

    assert_eq!(output, Some(json!("BA")));
  }

  #[test]
  fn test_parse_options_requires_object() {
    assert_eq!(parse_options(r#"{"from": "a"}"#).unwrap(), json!({"from": "a"}));
    assert!(parse_options("[1]").is_err());
    assert!(parse_options("{nope").is_err());
  }
}
