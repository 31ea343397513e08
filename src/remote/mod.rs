//! Remote tool-protocol support.
//!
//! A `RemoteClient` is bound to one server endpoint and owns its connection
//! lifecycle; the `ServerRegistry` manages the configured server set and one
//! client per server, aggregating their catalogs for the orchestrator.

pub mod protocol;

mod client;
mod config;
mod registry;

pub use client::{ConnectionState, RemoteClient};
pub use config::{
    load_servers_from, save_servers_to, AuthConfig, ServerKind, ServerRegistration, ServerStatus,
    ServersFile,
};
pub use registry::{ServerRegistry, ServerSummary};
