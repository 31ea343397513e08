//! In-process tool system.
//!
//! Tools are named, independently invocable units of functionality with a
//! declared JSON Schema for their parameters. The registry here holds only
//! in-process implementations; remote tools live behind `remote`.

pub mod builtin;

mod registry;
mod tool;

pub use registry::ToolRegistry;
pub use tool::{require_param, require_str, Tool, ToolOutput};
