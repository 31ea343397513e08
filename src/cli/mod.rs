//! CLI command handling.
//!
//! Provides subcommands for:
//! - Running a request as a workflow job (`run`)
//! - Inspecting and invoking tools (`tool list`, `tool info`, `tool invoke`)
//! - Managing remote servers (`server add`, `server remove`, `server list`,
//!   `server test`)
//! - Checking catalog and server health (`status`)

mod run;
mod server;
mod status;
mod tool;

pub use run::run_workflow_command;
pub use server::{run_server_command, ServerCommand};
pub use status::run_status_command;
pub use tool::{run_tool_command, ToolCommand};

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::warn;

use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::remote::{load_servers_from, ServerRegistry};
use crate::tools::ToolRegistry;

#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(about = "Tool orchestration runtime: unified catalogs, dependency-aware workflows, pollable jobs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Plan a workflow for a request and run it as a background job
    Run {
        /// Free-form request, matched against the tool catalog
        request: Option<String>,

        /// Execute an explicit plan from a JSON file instead of planning
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Print the plan without executing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect and invoke tools from the merged catalog
    #[command(subcommand)]
    Tool(ToolCommand),

    /// Manage remote tool servers
    #[command(subcommand)]
    Server(ServerCommand),

    /// Show catalog and server health
    Status,
}

/// Build the orchestrator the way every command needs it: builtin tools
/// registered, persisted servers loaded and connected where possible.
pub(crate) async fn build_orchestrator(config: &Config) -> anyhow::Result<Arc<Orchestrator>> {
    let registry = Arc::new(ToolRegistry::new());
    registry.register_builtin_tools().await?;

    let servers = Arc::new(ServerRegistry::new(config.remote.clone()));
    let file = load_servers_from(&config.remote.servers_path).await?;
    for registration in file.servers {
        let name = registration.name.clone();
        if let Err(e) = servers.add_server(registration).await {
            warn!(server = %name, error = %e, "skipping persisted server");
        }
    }

    Ok(Arc::new(Orchestrator::new(registry, servers)))
}
