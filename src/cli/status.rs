//! The `status` command: health and catalog overview.

use crate::cli::build_orchestrator;
use crate::config::Config;

pub async fn run_status_command() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let orchestrator = build_orchestrator(&config).await?;

    let health = orchestrator.get_health().await;
    let listing = orchestrator.list_all_tools().await;

    println!("status: {}", health.status);
    println!("internal tools: {}", health.internal_tools);
    println!(
        "servers: {}/{} reachable",
        health.reachable_servers, health.external_servers
    );
    for server in orchestrator.external().list_servers().await {
        println!("  {} {} ({})", server.name, server.endpoint, server.status);
    }
    println!(
        "catalog: {} tools ({} internal, {} external)",
        listing.tools.len(),
        listing.internal_count,
        listing.external_count
    );

    Ok(())
}
