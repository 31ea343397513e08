//! Tool descriptors and catalog merging.
//!
//! A catalog is the set of tool descriptors visible at a point in time.
//! Individual registries produce their own descriptor lists; the
//! orchestrator merges them with the collision rules implemented here.

use serde::{Deserialize, Serialize};

/// Where a tool is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    /// In-process implementation dispatched without network I/O.
    Internal,
    /// Hosted by a remote tool-protocol server.
    External,
}

impl std::fmt::Display for ToolSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::External => write!(f, "external"),
        }
    }
}

/// Metadata describing one invocable tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique within a catalog snapshot.
    pub name: String,
    pub description: String,
    /// JSON Schema for the accepted parameters.
    pub parameters_schema: serde_json::Value,
    pub source: ToolSource,
    /// Owning server name; present iff `source` is external.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl ToolDescriptor {
    /// Create an internal tool descriptor.
    pub fn internal(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
            source: ToolSource::Internal,
            server: None,
        }
    }

    /// Create an external tool descriptor tagged with its server.
    pub fn external(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: serde_json::Value,
        server: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
            source: ToolSource::External,
            server: Some(server.into()),
        }
    }
}

/// Merge internal and external catalogs into one view.
///
/// Internal descriptors win name collisions: locally hosted tools are
/// trusted and lower-latency. Shadowed external descriptors are dropped
/// and logged.
pub fn merge_catalogs(
    internal: Vec<ToolDescriptor>,
    external: Vec<ToolDescriptor>,
) -> Vec<ToolDescriptor> {
    let mut merged = internal;
    let internal_names: std::collections::HashSet<String> =
        merged.iter().map(|d| d.name.clone()).collect();

    for desc in external {
        if internal_names.contains(&desc.name) {
            tracing::debug!(
                tool = %desc.name,
                server = desc.server.as_deref().unwrap_or("unknown"),
                "External tool shadowed by internal tool with the same name"
            );
            continue;
        }
        merged.push(desc);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    #[test]
    fn test_internal_wins_collision() {
        let internal = vec![ToolDescriptor::internal("search", "local search", schema())];
        let external = vec![
            ToolDescriptor::external("search", "remote search", schema(), "alpha"),
            ToolDescriptor::external("draft", "draft claims", schema(), "alpha"),
        ];

        let merged = merge_catalogs(internal, external);
        assert_eq!(merged.len(), 2);

        let search = merged.iter().find(|d| d.name == "search").unwrap();
        assert_eq!(search.source, ToolSource::Internal);
        assert!(search.server.is_none());
        assert!(merged.iter().any(|d| d.name == "draft"));
    }

    #[test]
    fn test_merge_preserves_all_when_disjoint() {
        let internal = vec![ToolDescriptor::internal("echo", "echo", schema())];
        let external = vec![ToolDescriptor::external("fetch", "fetch", schema(), "beta")];
        assert_eq!(merge_catalogs(internal, external).len(), 2);
    }

    #[test]
    fn test_descriptor_serde_skips_absent_server() {
        let desc = ToolDescriptor::internal("echo", "echo", schema());
        let json = serde_json::to_value(&desc).unwrap();
        assert!(json.get("server").is_none());
        assert_eq!(json["source"], "internal");
    }
}
