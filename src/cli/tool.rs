//! Tool inspection and invocation commands.

use clap::Subcommand;

use crate::catalog::ToolSource;
use crate::cli::build_orchestrator;
use crate::config::Config;

#[derive(Subcommand, Debug, Clone)]
pub enum ToolCommand {
    /// List every tool in the merged catalog
    List {
        /// Show parameter schemas too
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show one tool's descriptor
    Info {
        /// Tool name
        name: String,
    },

    /// Invoke a tool and print its result
    Invoke {
        /// Tool name
        name: String,

        /// Parameters as a JSON object
        #[arg(default_value = "{}")]
        params: String,
    },
}

pub async fn run_tool_command(cmd: ToolCommand) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let orchestrator = build_orchestrator(&config).await?;

    match cmd {
        ToolCommand::List { verbose } => {
            let listing = orchestrator.list_all_tools().await;
            println!(
                "{} tools ({} internal, {} external)",
                listing.tools.len(),
                listing.internal_count,
                listing.external_count
            );
            for desc in listing.tools {
                let origin = match (&desc.source, &desc.server) {
                    (ToolSource::External, Some(server)) => format!("external:{server}"),
                    (ToolSource::External, None) => "external".to_string(),
                    (ToolSource::Internal, _) => "internal".to_string(),
                };
                println!("  {} [{}] - {}", desc.name, origin, desc.description);
                if verbose {
                    println!("    {}", serde_json::to_string(&desc.parameters_schema)?);
                }
            }
        }

        ToolCommand::Info { name } => match orchestrator.get_tool_info(&name).await {
            Some(desc) => {
                println!("name:        {}", desc.name);
                println!("source:      {:?}", desc.source);
                if let Some(server) = &desc.server {
                    println!("server:      {server}");
                }
                println!("description: {}", desc.description);
                println!(
                    "parameters:  {}",
                    serde_json::to_string_pretty(&desc.parameters_schema)?
                );
            }
            None => anyhow::bail!("tool '{name}' not found"),
        },

        ToolCommand::Invoke { name, params } => {
            let params: serde_json::Value = serde_json::from_str(&params)
                .map_err(|e| anyhow::anyhow!("parameters must be a JSON object: {e}"))?;
            let output = orchestrator.invoke(&name, params).await?;
            println!("{}", serde_json::to_string_pretty(&output.result)?);
            eprintln!("({}ms)", output.duration.as_millis());
        }
    }

    Ok(())
}
