//! Pipeline run controller.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde_json::Value;
use sluice_tool::ToolRegistry;
use sluice_workflow::{Workflow, WorkflowStep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::{ControllerConfig, MissingToolPolicy};
use crate::error::RunError;
use crate::events::{NoopNotifier, RunEvent, RunNotifier};
use crate::result::{RunState, StepResult, StepStatus};

/// The run currently owning the controller.
struct ActiveRun {
  run_id: String,
  cancel: CancellationToken,
}

#[derive(Default)]
struct Session {
  state: RunState,
  results: HashMap<String, StepResult>,
  active: Option<ActiveRun>,
}

/// Executes workflows one step at a time.
///
/// The controller owns the per-step [`StepResult`] map and the cancellation
/// token of the run in progress. It never holds a reference into the workflow
/// store: `run_pipeline` copies the step list when it starts, so editing the
/// stored workflow during a run has no effect on that run.
///
/// Only one run (or single-step execution) may be active at a time; a second
/// one is rejected with [`RunError::AlreadyRunning`].
///
/// Cancellation is cooperative. The token is checked before each step and
/// again right before a tool is invoked; a tool call already in flight always
/// runs to completion.
pub struct RunController<R: ToolRegistry, N: RunNotifier = NoopNotifier> {
  registry: R,
  config: ControllerConfig,
  notifier: N,
  session: Mutex<Session>,
}

impl<R: ToolRegistry> RunController<R, NoopNotifier> {
  /// Create a controller with default configuration and no event observer.
  pub fn new(registry: R) -> Self {
    Self::with_notifier(registry, ControllerConfig::default(), NoopNotifier)
  }
}

impl<R: ToolRegistry, N: RunNotifier> RunController<R, N> {
  pub fn with_notifier(registry: R, config: ControllerConfig, notifier: N) -> Self {
    Self {
      registry,
      config,
      notifier,
      session: Mutex::new(Session::default()),
    }
  }

  /// Run every step of `workflow` in order, feeding each step the previous
  /// step's output.
  ///
  /// Clears all previous step results first. On success returns the final
  /// output: the output recorded for the last step, or `None` for a workflow
  /// without steps. A failing step halts the run; later steps stay `pending`.
  #[instrument(
    name = "pipeline_run",
    skip(self, workflow, initial_input),
    fields(workflow_id = %workflow.id)
  )]
  pub async fn run_pipeline(
    &self,
    workflow: &Workflow,
    initial_input: Value,
  ) -> Result<Option<Value>, RunError> {
    let steps = workflow.steps.clone();
    let run = self.begin(true)?;

    info!(
      run_id = %run.run_id,
      workflow_id = %workflow.id,
      steps = steps.len(),
      "run_started"
    );
    self.emit(&run, RunEvent::RunStarted {
      run_id: run.run_id.clone(),
      workflow_id: workflow.id.clone(),
      steps: steps.len(),
    });

    let result = self.run_steps(&run, &steps, initial_input).await;

    let state = match &result {
      Ok(_) => {
        info!(run_id = %run.run_id, "run_completed");
        RunState::Completed
      }
      Err(RunError::Cancelled) => {
        warn!(run_id = %run.run_id, "run_cancelled");
        RunState::Cancelled
      }
      Err(e) => {
        error!(run_id = %run.run_id, error = %e, "run_failed");
        RunState::Failed
      }
    };

    let run_id = run.run_id.clone();
    if !run.finish(state) {
      warn!(run_id = %run_id, "run_detached");
      return Err(RunError::Cancelled);
    }
    self.notifier.notify(RunEvent::RunFinished { run_id, state });

    result?;
    Ok(self.final_output_of(&steps))
  }

  /// Run the step at `index` alone, merging its result into the existing map.
  ///
  /// Step 0 receives `initial_input`. Any other step receives the recorded
  /// output of the step before it; if there is none the call fails with
  /// [`RunError::PrerequisiteMissing`] and nothing is recorded. Predecessors are
  /// never run implicitly.
  #[instrument(
    name = "single_step_run",
    skip(self, workflow, initial_input),
    fields(workflow_id = %workflow.id)
  )]
  pub async fn run_single_step(
    &self,
    workflow: &Workflow,
    index: usize,
    initial_input: Value,
  ) -> Result<Value, RunError> {
    let step = workflow
      .steps
      .get(index)
      .cloned()
      .ok_or(RunError::StepOutOfRange {
        index,
        len: workflow.steps.len(),
      })?;

    let input = match index.checked_sub(1) {
      None => initial_input,
      Some(previous) => {
        let previous_step_id = &workflow.steps[previous].id;
        let output = self
          .session()
          .results
          .get(previous_step_id)
          .and_then(|r| r.output.clone());
        output.ok_or_else(|| RunError::PrerequisiteMissing {
          index,
          previous_step_id: previous_step_id.clone(),
        })?
      }
    };

    let run = self.begin(false)?;
    let result = self.run_step(&run, &step, input).await;
    if !run.finish(RunState::Idle) {
      return Err(RunError::Cancelled);
    }
    result
  }

  /// Request cancellation of the active run. Returns whether a run was active.
  pub fn cancel_run(&self) -> bool {
    match &self.session().active {
      Some(active) => {
        info!(run_id = %active.run_id, "cancel_requested");
        active.cancel.cancel();
        true
      }
      None => false,
    }
  }

  /// Clear all step results and return to `Idle`.
  ///
  /// An active run is cancelled and detached: anything it produces afterwards
  /// is discarded.
  pub fn reset_run(&self) {
    let mut session = self.session();
    if let Some(active) = session.active.take() {
      active.cancel.cancel();
    }
    session.results.clear();
    session.state = RunState::Idle;
  }

  /// Lifecycle state of the most recent full run.
  pub fn state(&self) -> RunState {
    self.session().state
  }

  /// Whether a run or single step currently owns the controller.
  pub fn is_running(&self) -> bool {
    self.session().active.is_some()
  }

  /// Snapshot of every recorded step result, keyed by step id.
  pub fn results(&self) -> HashMap<String, StepResult> {
    self.session().results.clone()
  }

  pub fn step_result(&self, step_id: &str) -> Option<StepResult> {
    self.session().results.get(step_id).cloned()
  }

  /// Status of a step; steps without a recorded result are `Pending`.
  pub fn step_status(&self, step_id: &str) -> StepStatus {
    self
      .session()
      .results
      .get(step_id)
      .map(|r| r.status)
      .unwrap_or_default()
  }

  /// The output recorded for the workflow's last step, if any.
  pub fn final_output(&self, workflow: &Workflow) -> Option<Value> {
    self.final_output_of(&workflow.steps)
  }

  fn final_output_of(&self, steps: &[WorkflowStep]) -> Option<Value> {
    let last = steps.last()?;
    self
      .session()
      .results
      .get(&last.id)
      .and_then(|r| r.output.clone())
  }

  async fn run_steps(
    &self,
    run: &RunHandle<'_, R, N>,
    steps: &[WorkflowStep],
    initial_input: Value,
  ) -> Result<Value, RunError> {
    let mut current = initial_input;
    for step in steps {
      if run.cancel.is_cancelled() {
        return Err(RunError::Cancelled);
      }
      current = self.run_step(run, step, current).await?;
    }
    Ok(current)
  }

  /// Execute one step and record its result.
  async fn run_step(
    &self,
    run: &RunHandle<'_, R, N>,
    step: &WorkflowStep,
    input: Value,
  ) -> Result<Value, RunError> {
    if step.disabled {
      self.record(run, &step.id, StepResult::success(input.clone(), None));
      info!(run_id = %run.run_id, step_id = %step.id, "step_skipped");
      self.emit(run, RunEvent::StepSkipped {
        run_id: run.run_id.clone(),
        step_id: step.id.clone(),
      });
      return Ok(input);
    }

    let process = self
      .registry
      .get(&step.tool_id)
      .and_then(|tool| tool.process.clone());
    let Some(process) = process else {
      return self.run_missing_tool(run, step, input);
    };

    if run.cancel.is_cancelled() {
      return Err(RunError::Cancelled);
    }

    self.mark_started(run, step);
    let started = Instant::now();
    let result = process.process(input, &step.options).await;
    let duration_ms = Some(elapsed_ms(started));

    match result {
      Ok(output) => {
        self.record(
          run,
          &step.id,
          StepResult::success(output.clone(), duration_ms),
        );
        info!(
          run_id = %run.run_id,
          step_id = %step.id,
          duration_ms = ?duration_ms,
          "step_completed"
        );
        self.emit(run, RunEvent::StepCompleted {
          run_id: run.run_id.clone(),
          step_id: step.id.clone(),
          output: output.clone(),
          duration_ms,
        });
        Ok(output)
      }
      Err(source) => {
        let message = source.to_string();
        self.record(
          run,
          &step.id,
          StepResult::error(message.clone(), duration_ms),
        );
        error!(
          run_id = %run.run_id,
          step_id = %step.id,
          tool_id = %step.tool_id,
          error = %message,
          "step_failed"
        );
        self.emit(run, RunEvent::StepFailed {
          run_id: run.run_id.clone(),
          step_id: step.id.clone(),
          error: message,
        });
        Err(RunError::ToolExecution {
          step_id: step.id.clone(),
          tool_id: step.tool_id.clone(),
          source,
        })
      }
    }
  }

  /// Handle a step whose tool is unknown or has no `process` capability.
  fn run_missing_tool(
    &self,
    run: &RunHandle<'_, R, N>,
    step: &WorkflowStep,
    input: Value,
  ) -> Result<Value, RunError> {
    self.mark_started(run, step);

    match self.config.missing_tool {
      MissingToolPolicy::PassThrough => {
        warn!(
          run_id = %run.run_id,
          step_id = %step.id,
          tool_id = %step.tool_id,
          "step_passed_through"
        );
        self.record(run, &step.id, StepResult::success(input.clone(), Some(0)));
        self.emit(run, RunEvent::StepCompleted {
          run_id: run.run_id.clone(),
          step_id: step.id.clone(),
          output: input.clone(),
          duration_ms: Some(0),
        });
        Ok(input)
      }
      MissingToolPolicy::Fail => {
        let err = RunError::MissingCapability {
          step_id: step.id.clone(),
          tool_id: step.tool_id.clone(),
        };
        self.record(run, &step.id, StepResult::error(err.to_string(), Some(0)));
        error!(run_id = %run.run_id, step_id = %step.id, error = %err, "step_failed");
        self.emit(run, RunEvent::StepFailed {
          run_id: run.run_id.clone(),
          step_id: step.id.clone(),
          error: err.to_string(),
        });
        Err(err)
      }
    }
  }

  fn mark_started(&self, run: &RunHandle<'_, R, N>, step: &WorkflowStep) {
    self.record(run, &step.id, StepResult::running());
    info!(
      run_id = %run.run_id,
      step_id = %step.id,
      tool_id = %step.tool_id,
      "step_started"
    );
    self.emit(run, RunEvent::StepStarted {
      run_id: run.run_id.clone(),
      step_id: step.id.clone(),
      tool_id: step.tool_id.clone(),
    });
  }

  /// Write a step result, unless the run has been detached by `reset_run`.
  fn record(&self, run: &RunHandle<'_, R, N>, step_id: &str, result: StepResult) {
    let mut session = self.session();
    if session.owned_by(&run.run_id) {
      session.results.insert(step_id.to_string(), result);
    }
  }

  /// Publish an event, unless the run has been detached by `reset_run`.
  fn emit(&self, run: &RunHandle<'_, R, N>, event: RunEvent) {
    let owned = self.session().owned_by(&run.run_id);
    if owned {
      self.notifier.notify(event);
    }
  }

  /// Take ownership of the controller for a new run.
  fn begin(&self, full_run: bool) -> Result<RunHandle<'_, R, N>, RunError> {
    let mut session = self.session();
    if session.active.is_some() {
      return Err(RunError::AlreadyRunning);
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    let cancel = CancellationToken::new();
    session.active = Some(ActiveRun {
      run_id: run_id.clone(),
      cancel: cancel.clone(),
    });
    if full_run {
      session.results.clear();
      session.state = RunState::Running;
    }

    Ok(RunHandle {
      controller: self,
      run_id,
      cancel,
      full_run,
    })
  }

  fn session(&self) -> MutexGuard<'_, Session> {
    self.session.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Session {
  fn owned_by(&self, run_id: &str) -> bool {
    self.active.as_ref().is_some_and(|a| a.run_id == run_id)
  }
}

/// Ownership of the controller by one run.
///
/// Dropping the handle discards the cancellation token. A full run dropped
/// before reaching a terminal state (its future was dropped) ends `Cancelled`.
struct RunHandle<'a, R: ToolRegistry, N: RunNotifier> {
  controller: &'a RunController<R, N>,
  run_id: String,
  cancel: CancellationToken,
  full_run: bool,
}

impl<R: ToolRegistry, N: RunNotifier> RunHandle<'_, R, N> {
  /// Record the terminal state (full runs only) and release the controller.
  ///
  /// Returns `false` if the run had already been detached by `reset_run`.
  fn finish(self, state: RunState) -> bool {
    let mut session = self.controller.session();
    let owned = session.owned_by(&self.run_id);
    if owned && self.full_run {
      session.state = state;
    }
    // Release the lock before `Drop` takes it again.
    drop(session);
    owned
  }
}

impl<R: ToolRegistry, N: RunNotifier> Drop for RunHandle<'_, R, N> {
  fn drop(&mut self) {
    let mut session = self.controller.session();
    if !session.owned_by(&self.run_id) {
      return;
    }
    session.active = None;
    if self.full_run && session.state == RunState::Running {
      session.state = RunState::Cancelled;
    }
  }
}

fn elapsed_ms(started: Instant) -> u64 {
  u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
