//! Built-in tools.
//!
//! A small set of trusted in-process tools used by the CLI and as
//! realistic registry content in tests.

mod echo;
mod json;
mod time;

pub use echo::EchoTool;
pub use json::JsonTool;
pub use time::TimeTool;
