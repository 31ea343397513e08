//! Internal tool registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::catalog::ToolDescriptor;
use crate::error::ToolError;
use crate::tools::builtin::{EchoTool, JsonTool, TimeTool};
use crate::tools::tool::{Tool, ToolOutput};

/// Registry of in-process tools. Purely local dispatch, no network I/O.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool.
    ///
    /// Fails with `ToolError::Duplicate` if the name is already taken in
    /// this registry. Cross-source collisions are the orchestrator's job.
    pub async fn register(&self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().await;
        if tools.contains_key(&name) {
            return Err(ToolError::Duplicate { name });
        }
        tools.insert(name.clone(), tool);
        tracing::debug!("Registered tool: {}", name);
        Ok(())
    }

    /// Unregister a tool.
    pub async fn unregister(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.write().await.remove(name)
    }

    /// Get a tool by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    /// Check if a tool exists.
    pub async fn has(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// Get the number of registered tools.
    pub async fn count(&self) -> usize {
        self.tools.read().await.len()
    }

    /// List descriptors for every registered tool.
    pub async fn list(&self) -> Vec<ToolDescriptor> {
        self.tools
            .read()
            .await
            .values()
            .map(|tool| {
                ToolDescriptor::internal(
                    tool.name(),
                    tool.description(),
                    tool.parameters_schema(),
                )
            })
            .collect()
    }

    /// Invoke a tool by name, enforcing its execution timeout.
    ///
    /// Fails with `ToolError::NotFound` for unregistered names; handler
    /// failures propagate as the tool's own error.
    pub async fn invoke(
        &self,
        name: &str,
        params: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self
            .get(name)
            .await
            .ok_or_else(|| ToolError::NotFound {
                name: name.to_string(),
            })?;

        let timeout = tool.execution_timeout();
        match tokio::time::timeout(timeout, tool.invoke(params)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                name: name.to_string(),
                timeout,
            }),
        }
    }

    /// Register the built-in demo tools.
    pub async fn register_builtin_tools(&self) -> Result<(), ToolError> {
        self.register(Arc::new(EchoTool)).await?;
        self.register(Arc::new(TimeTool)).await?;
        self.register(Arc::new(JsonTool)).await?;

        tracing::info!("Registered {} built-in tools", self.count().await);
        Ok(())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
