//! Echo tool.

use async_trait::async_trait;

use crate::error::ToolError;
use crate::tools::tool::{require_str, Tool, ToolOutput};

/// Echoes back the input message. Useful for testing.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the input message. Useful for testing."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo back"
                }
            },
            "required": ["message"]
        })
    }

    async fn invoke(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = std::time::Instant::now();
        let message = require_str(&params, self.name(), "message")?;
        Ok(ToolOutput::text(message, start.elapsed()))
    }
}
