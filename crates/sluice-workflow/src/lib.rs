//! Sluice Workflow
//!
//! This crate contains the workflow definition types shared by the store and the
//! run controller, plus the portable document format used for export, import and
//! sharing.
//!
//! A [`Workflow`] is a named, ordered sequence of [`WorkflowStep`]s. Step order is
//! execution order; there is no separate priority field.
//!
//! Identifiers are opaque strings. Step ids are only unique within their owning
//! workflow and are regenerated whenever steps are copied into another identifier
//! space (duplication, import, template instantiation).

mod document;
mod error;
mod template;
mod workflow;

pub use document::{
  FORMAT_VERSION, export_to_string, export_workflow, import_from_str, import_workflow,
};
pub use error::FormatError;
pub use template::{WorkflowTemplate, builtin_templates, find_template};
pub use workflow::{StepPatch, StepSeed, Workflow, WorkflowPatch, WorkflowStep, new_id};
