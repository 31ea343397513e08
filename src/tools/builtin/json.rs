//! JSON manipulation tool.

use async_trait::async_trait;

use crate::error::ToolError;
use crate::tools::tool::{require_param, require_str, Tool, ToolOutput};

/// Tool for querying and reshaping JSON values.
pub struct JsonTool;

#[async_trait]
impl Tool for JsonTool {
    fn name(&self) -> &str {
        "json"
    }

    fn description(&self) -> &str {
        "Query a JSON value: extract a field by dotted path, list keys, or count array elements."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["get", "keys", "length"],
                    "description": "The JSON operation to perform"
                },
                "data": {
                    "description": "The JSON value to operate on"
                },
                "path": {
                    "type": "string",
                    "description": "Dotted field path (for get operation)"
                }
            },
            "required": ["operation", "data"]
        })
    }

    async fn invoke(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = std::time::Instant::now();

        let operation = require_str(&params, self.name(), "operation")?;
        let data = require_param(&params, self.name(), "data")?;

        let result = match operation {
            "get" => {
                let path = require_str(&params, self.name(), "path")?;
                let mut current = data;
                for segment in path.split('.') {
                    current =
                        current
                            .get(segment)
                            .ok_or_else(|| ToolError::ExecutionFailed {
                                name: self.name().to_string(),
                                reason: format!("path segment '{}' not found", segment),
                            })?;
                }
                current.clone()
            }
            "keys" => match data.as_object() {
                Some(map) => serde_json::json!(map.keys().collect::<Vec<_>>()),
                None => {
                    return Err(ToolError::InvalidParameters {
                        name: self.name().to_string(),
                        reason: "'data' must be an object for keys".to_string(),
                    });
                }
            },
            "length" => match data.as_array() {
                Some(arr) => serde_json::json!(arr.len()),
                None => {
                    return Err(ToolError::InvalidParameters {
                        name: self.name().to_string(),
                        reason: "'data' must be an array for length".to_string(),
                    });
                }
            },
            _ => {
                return Err(ToolError::InvalidParameters {
                    name: self.name().to_string(),
                    reason: format!("unknown operation: {}", operation),
                });
            }
        };

        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_nested_path() {
        let out = JsonTool
            .invoke(serde_json::json!({
                "operation": "get",
                "data": {"a": {"b": 42}},
                "path": "a.b",
            }))
            .await
            .unwrap();
        assert_eq!(out.result, serde_json::json!(42));
    }

    #[tokio::test]
    async fn test_length() {
        let out = JsonTool
            .invoke(serde_json::json!({
                "operation": "length",
                "data": [1, 2, 3],
            }))
            .await
            .unwrap();
        assert_eq!(out.result, serde_json::json!(3));
    }

    #[tokio::test]
    async fn test_missing_path_fails() {
        let err = JsonTool
            .invoke(serde_json::json!({
                "operation": "get",
                "data": {"a": 1},
                "path": "b",
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }
}
