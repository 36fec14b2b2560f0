//! Sluice Tool
//!
//! Tool capability descriptors and the registry the pipeline engine resolves
//! step `tool_id`s against.
//!
//! A tool is a single unit of work exposing `process(input, options) -> output`.
//! Tools may additionally declare the data types they consume and produce; a tool
//! that declares both is *pipeline-eligible* and can be offered as a next-step
//! suggestion.
//!
//! The registry is read-only from the engine's point of view. Registration order
//! is preserved and is the order suggestions are returned in.

mod builtin;
mod descriptor;
mod error;
mod registry;

pub use builtin::builtin_registry;
pub use descriptor::{FnProcess, ToolDescriptor, ToolProcess};
pub use error::ToolError;
pub use registry::{InMemoryToolRegistry, ToolRegistry};
