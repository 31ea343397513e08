//! External server registry.
//!
//! Owns one `RemoteClient` per registered server and aggregates their
//! catalogs. Discovery fans out concurrently and treats unreachable
//! servers as a recorded degradation, never a hard failure of the listing.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::catalog::ToolDescriptor;
use crate::config::RemoteConfig;
use crate::error::ServerError;
use crate::remote::client::RemoteClient;
use crate::remote::config::{ServerRegistration, ServerStatus};
use crate::tools::ToolOutput;

/// One registered server with its live client.
struct ServerEntry {
    registration: ServerRegistration,
    client: Arc<RemoteClient>,
    /// Gate excluding in-flight calls from racing a concurrent removal:
    /// calls hold the read side, removal acquires the write side before
    /// dropping the client.
    gate: Arc<RwLock<()>>,
}

/// Summary of one registered server for listing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServerSummary {
    pub id: Uuid,
    pub name: String,
    pub endpoint: String,
    pub status: ServerStatus,
}

/// Registry of remote tool servers.
pub struct ServerRegistry {
    config: RemoteConfig,
    servers: RwLock<HashMap<Uuid, ServerEntry>>,
}

impl ServerRegistry {
    /// Create an empty registry.
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            servers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a server and attempt the initial connection.
    ///
    /// The registration is validated first; a malformed endpoint is
    /// rejected outright. The name check and the insert happen under one
    /// write lock so concurrent registrations cannot both claim a name;
    /// the entry is inserted before connecting and its status updated
    /// afterwards. Connection failure does not fail registration — the
    /// server is kept as `Unreachable` and retried on later use.
    pub async fn add_server(
        &self,
        registration: ServerRegistration,
    ) -> Result<Uuid, ServerError> {
        registration.validate()?;

        let id = registration.id;
        let name = registration.name.clone();
        let client = Arc::new(RemoteClient::new(
            registration.clone(),
            self.config.clone(),
        )?);

        {
            let mut servers = self.servers.write().await;
            if servers
                .values()
                .any(|e| e.registration.name == registration.name)
            {
                return Err(ServerError::InvalidConfig {
                    reason: format!("server name '{}' is already registered", registration.name),
                });
            }
            servers.insert(
                id,
                ServerEntry {
                    registration,
                    client: Arc::clone(&client),
                    gate: Arc::new(RwLock::new(())),
                },
            );
        }

        let status = match client.connect().await {
            Ok(_) => ServerStatus::Connected,
            Err(e) => {
                tracing::warn!(
                    server = %name,
                    "Initial connection failed, keeping server as unreachable: {}",
                    e
                );
                ServerStatus::Unreachable
            }
        };

        // The entry can be concurrently removed while connecting.
        if let Some(entry) = self.servers.write().await.get_mut(&id) {
            entry.registration.status = status;
        }

        Ok(id)
    }

    /// Remove a server by id. Idempotent: removing an absent id is not an
    /// error. Waits for in-flight calls on that server to finish before
    /// releasing the client.
    pub async fn remove_server(&self, id: Uuid) {
        let entry = self.servers.write().await.remove(&id);

        if let Some(entry) = entry {
            // Acquiring the write side of the gate waits out every
            // in-flight discover/invoke holding the read side.
            let _exclusive = entry.gate.write().await;
            entry.client.disconnect();
            tracing::info!(server = %entry.registration.name, "Removed server");
        }
    }

    /// List registered servers with their last known status.
    pub async fn list_servers(&self) -> Vec<ServerSummary> {
        self.servers
            .read()
            .await
            .values()
            .map(|e| ServerSummary {
                id: e.registration.id,
                name: e.registration.name.clone(),
                endpoint: e.registration.endpoint.clone(),
                status: if e.client.is_healthy() {
                    ServerStatus::Connected
                } else {
                    e.registration.status
                },
            })
            .collect()
    }

    /// Number of registered servers.
    pub async fn server_count(&self) -> usize {
        self.servers.read().await.len()
    }

    /// Number of servers currently connected.
    pub async fn reachable_count(&self) -> usize {
        self.servers
            .read()
            .await
            .values()
            .filter(|e| e.client.is_healthy())
            .count()
    }

    /// Discover tools across all registered servers concurrently.
    ///
    /// Each descriptor is tagged with its server name. Unreachable servers
    /// are skipped and logged; the result is a partial catalog, never an
    /// error. Name collisions between servers resolve first-discovered
    /// wins.
    pub async fn list_all_tools(&self) -> Vec<ToolDescriptor> {
        let mut tasks: JoinSet<(String, Result<Vec<ToolDescriptor>, ServerError>)> =
            JoinSet::new();

        {
            let servers = self.servers.read().await;
            for entry in servers.values() {
                let client = Arc::clone(&entry.client);
                let gate = Arc::clone(&entry.gate);
                let name = entry.registration.name.clone();

                tasks.spawn(async move {
                    let _held = gate.read().await;

                    if !client.is_healthy() && client.connect().await.is_err() {
                        return (
                            name.clone(),
                            Err(ServerError::Unavailable { name }),
                        );
                    }

                    let result = client.discover_tools().await.map(|tools| {
                        tools
                            .into_iter()
                            .map(|t| {
                                ToolDescriptor::external(
                                    t.name,
                                    t.description,
                                    t.input_schema,
                                    name.clone(),
                                )
                            })
                            .collect()
                    });
                    (name, result)
                });
            }
        }

        let mut seen = std::collections::HashSet::new();
        let mut catalog = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let Ok((server, result)) = joined else {
                continue;
            };
            match result {
                Ok(tools) => {
                    for tool in tools {
                        if seen.insert(tool.name.clone()) {
                            catalog.push(tool);
                        } else {
                            tracing::debug!(
                                tool = %tool.name,
                                server = %server,
                                "Tool name already discovered on another server, keeping first"
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(server = %server, "Excluding unreachable server from catalog: {}", e);
                }
            }
        }

        catalog
    }

    /// Invoke a tool on the server that owns it.
    ///
    /// `server_hint` skips the lookup when the caller already knows the
    /// owner. Fails with `ServerError::Unavailable` if the owning client is
    /// not connected, and `ServerError::NotFound` if no server owns the
    /// name.
    pub async fn invoke(
        &self,
        tool_name: &str,
        server_hint: Option<&str>,
        params: serde_json::Value,
    ) -> Result<ToolOutput, ServerError> {
        let target = match server_hint {
            Some(hint) => Some(hint.to_string()),
            None => self.find_owner(tool_name).await,
        };

        let Some(server_name) = target else {
            return Err(ServerError::NotFound {
                name: tool_name.to_string(),
            });
        };

        let (client, gate) = {
            let servers = self.servers.read().await;
            let entry = servers
                .values()
                .find(|e| e.registration.name == server_name)
                .ok_or_else(|| ServerError::NotFound {
                    name: server_name.clone(),
                })?;
            (Arc::clone(&entry.client), Arc::clone(&entry.gate))
        };

        let _held = gate.read().await;

        if !client.is_healthy() {
            return Err(ServerError::Unavailable { name: server_name });
        }

        let start = std::time::Instant::now();
        let result = client.invoke(tool_name, params).await?;

        if result.is_error {
            return Err(ServerError::Protocol {
                name: server_name,
                message: result.text(),
                code: 0,
            });
        }

        Ok(ToolOutput::text(result.text(), start.elapsed()))
    }

    /// Find which connected server owns a tool name.
    async fn find_owner(&self, tool_name: &str) -> Option<String> {
        let servers = self.servers.read().await;
        let clients: Vec<(String, Arc<RemoteClient>)> = servers
            .values()
            .filter(|e| e.client.is_healthy())
            .map(|e| (e.registration.name.clone(), Arc::clone(&e.client)))
            .collect();
        drop(servers);

        for (name, client) in clients {
            if let Ok(tools) = client.discover_tools().await {
                if tools.iter().any(|t| t.name == tool_name) {
                    return Some(name);
                }
            }
        }
        None
    }
}
