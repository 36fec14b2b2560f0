//! Sluice Engine
//!
//! This crate runs workflows. It provides:
//! - [`RunController`]: executes a workflow's steps strictly in order against an
//!   initial input, records a [`StepResult`] per step, supports cooperative
//!   cancellation and re-running a single step.
//! - [`suggest_next`]: offers tools that can follow the last step of a workflow
//!   while it is being edited.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       RunController                         │
//! │  - run_pipeline(workflow, input)   snapshot steps, loop     │
//! │  - run_single_step(workflow, i)    uses step i-1's output   │
//! │  - cancel_run() / reset_run()                               │
//! │  - owns StepResult map + CancellationToken of active run    │
//! └─────────────────────────────────────────────────────────────┘
//!                               │ lookup(tool_id)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ToolRegistry                          │
//! │  - ToolDescriptor { input_types, output_types, process }    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use sluice_engine::RunController;
//! use sluice_tool::builtin_registry;
//!
//! let controller = RunController::new(builtin_registry());
//! let output = controller.run_pipeline(&workflow, serde_json::json!("ab")).await?;
//! ```

mod config;
mod controller;
mod error;
mod events;
mod result;
mod suggest;

pub use config::{ControllerConfig, MissingToolPolicy};
pub use controller::RunController;
pub use error::RunError;
pub use events::{ChannelNotifier, NoopNotifier, RunEvent, RunNotifier};
pub use result::{RunState, StepResult, StepStatus};
pub use suggest::{GENERIC_INPUT_TYPES, MAX_SUGGESTIONS, suggest_next};
