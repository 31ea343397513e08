//! Conductor - main entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use conductor::cli::{
    run_server_command, run_status_command, run_tool_command, run_workflow_command, Cli, Command,
};

fn init_tracing(default: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            request,
            plan,
            dry_run,
        } => {
            init_tracing("info");
            run_workflow_command(request, plan, dry_run).await
        }
        Command::Tool(cmd) => {
            init_tracing("warn");
            run_tool_command(cmd).await
        }
        Command::Server(cmd) => {
            init_tracing("warn");
            run_server_command(cmd).await
        }
        Command::Status => {
            init_tracing("warn");
            run_status_command().await
        }
    }
}
