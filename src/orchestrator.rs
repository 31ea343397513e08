//! Orchestrator: one logical catalog and execution entry point.
//!
//! Composes the internal tool registry and the external server registry.
//! Internal tools win name collisions and are checked first on invocation,
//! so a name registered only internally never touches a remote client.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::catalog::{merge_catalogs, ToolDescriptor, ToolSource};
use crate::error::{Error, ToolError};
use crate::remote::ServerRegistry;
use crate::tools::{ToolOutput, ToolRegistry};

/// Aggregate health of the orchestrated tool sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Internal registry operational and no external regression.
    Healthy,
    /// Fewer external servers reachable than on the last healthy poll.
    /// Internal tools remain usable.
    Degraded,
    /// The internal registry itself failed. Never caused by external
    /// unreachability alone.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health report returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub internal_tools: usize,
    pub external_servers: usize,
    pub reachable_servers: usize,
}

/// Counts by source alongside a merged catalog listing.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogListing {
    pub tools: Vec<ToolDescriptor>,
    pub internal_count: usize,
    pub external_count: usize,
}

/// Composes internal and external tool sources behind one contract.
///
/// Constructed once at process start and passed by handle to every
/// consumer; there is no ambient global lookup.
pub struct Orchestrator {
    internal: Arc<ToolRegistry>,
    external: Arc<ServerRegistry>,
    /// Reachable-server count observed on the last poll that was not a
    /// regression; the baseline for degradation detection.
    last_reachable: Mutex<usize>,
}

impl Orchestrator {
    /// Create an orchestrator over the given registries.
    pub fn new(internal: Arc<ToolRegistry>, external: Arc<ServerRegistry>) -> Self {
        Self {
            internal,
            external,
            last_reachable: Mutex::new(0),
        }
    }

    /// Access the internal registry (for registration at startup).
    pub fn internal(&self) -> &Arc<ToolRegistry> {
        &self.internal
    }

    /// Access the external server registry (for admin operations).
    pub fn external(&self) -> &Arc<ServerRegistry> {
        &self.external
    }

    /// List the merged catalog with counts by source.
    ///
    /// Internal descriptors win name collisions.
    pub async fn list_all_tools(&self) -> CatalogListing {
        let internal = self.internal.list().await;
        let external = self.external.list_all_tools().await;

        let tools = merge_catalogs(internal, external);
        let internal_count = tools
            .iter()
            .filter(|d| d.source == ToolSource::Internal)
            .count();
        let external_count = tools.len() - internal_count;

        CatalogListing {
            tools,
            internal_count,
            external_count,
        }
    }

    /// Get the descriptor for one tool, if present in the merged catalog.
    pub async fn get_tool_info(&self, name: &str) -> Option<ToolDescriptor> {
        // Internal first, mirroring the collision rule.
        if let Some(desc) = self.internal.list().await.into_iter().find(|d| d.name == name) {
            return Some(desc);
        }
        self.external
            .list_all_tools()
            .await
            .into_iter()
            .find(|d| d.name == name)
    }

    /// Invoke a tool by name: internal registry first, then external.
    ///
    /// Fails with `ToolError::NotFound` when absent from both.
    pub async fn invoke(&self, name: &str, params: serde_json::Value) -> Result<ToolOutput, Error> {
        if self.internal.has(name).await {
            return Ok(self.internal.invoke(name, params).await?);
        }

        match self.external.invoke(name, None, params).await {
            Ok(output) => Ok(output),
            Err(crate::error::ServerError::NotFound { .. }) => Err(ToolError::NotFound {
                name: name.to_string(),
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Aggregate health across sources.
    ///
    /// Degraded when the reachable external set shrank since the last
    /// non-regressed poll; total external loss is still only degraded
    /// because internal tools remain usable.
    pub async fn get_health(&self) -> HealthReport {
        let internal_tools = self.internal.count().await;
        let external_servers = self.external.server_count().await;
        let reachable = self.external.reachable_count().await;

        let mut baseline = self.last_reachable.lock().await;
        let status = if reachable >= *baseline {
            *baseline = reachable;
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthReport {
            status,
            internal_tools,
            external_servers,
            reachable_servers: reachable,
        }
    }
}
