//! Run events and notifiers.
//!
//! Events are emitted as the controller records step results so a presentation
//! layer can render progress without polling the result map.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::result::RunState;

/// Events emitted while running a workflow or a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunEvent {
  /// A full pipeline run has started.
  RunStarted {
    run_id: String,
    workflow_id: String,
    steps: usize,
  },

  /// A step's tool is about to be invoked.
  StepStarted {
    run_id: String,
    step_id: String,
    tool_id: String,
  },

  /// A step passed its input through without invoking a tool.
  StepSkipped { run_id: String, step_id: String },

  /// A step finished successfully.
  StepCompleted {
    run_id: String,
    step_id: String,
    output: serde_json::Value,
    duration_ms: Option<u64>,
  },

  /// A step failed.
  StepFailed {
    run_id: String,
    step_id: String,
    error: String,
  },

  /// A full pipeline run reached a terminal state.
  RunFinished { run_id: String, state: RunState },
}

/// Receives run events.
///
/// `notify` is called synchronously from the run loop; implementations must
/// not block.
pub trait RunNotifier: Send + Sync {
  fn notify(&self, event: RunEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl RunNotifier for NoopNotifier {
  fn notify(&self, _event: RunEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls the run loop; volume is a few
  // events per step.
  sender: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<RunEvent>) -> Self {
    Self { sender }
  }

  /// Create a notifier together with its receiving end.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl RunNotifier for ChannelNotifier {
  fn notify(&self, event: RunEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

impl<N: RunNotifier + ?Sized> RunNotifier for std::sync::Arc<N> {
  fn notify(&self, event: RunEvent) {
    (**self).notify(event)
  }
}
