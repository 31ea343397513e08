//! Remote server management commands.
//!
//! These operate on the persisted registrations file; the long-lived
//! registry picks changes up the next time a command builds it.

use clap::Subcommand;
use secrecy::SecretString;

use crate::config::Config;
use crate::remote::{
    load_servers_from, save_servers_to, AuthConfig, ServerRegistration, ServerRegistry,
    ServerStatus,
};

#[derive(Subcommand, Debug, Clone)]
pub enum ServerCommand {
    /// Register a remote server and test connectivity
    Add {
        /// Display name, unique among registered servers
        name: String,

        /// Server URL (HTTPS, or HTTP for loopback dev servers)
        endpoint: String,

        /// Bearer API key for the server
        #[arg(long, env = "CONDUCTOR_SERVER_API_KEY")]
        api_key: Option<String>,

        /// Basic auth username
        #[arg(long, requires = "password")]
        username: Option<String>,

        /// Basic auth password
        #[arg(long, env = "CONDUCTOR_SERVER_PASSWORD", requires = "username")]
        password: Option<String>,
    },

    /// Remove a registered server
    Remove {
        /// Server name
        name: String,
    },

    /// List registered servers
    List,

    /// Connect to a registered server and list its tools
    Test {
        /// Server name
        name: String,
    },
}

pub async fn run_server_command(cmd: ServerCommand) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let path = &config.remote.servers_path;

    match cmd {
        ServerCommand::Add {
            name,
            endpoint,
            api_key,
            username,
            password,
        } => {
            let auth = match (api_key, username, password) {
                (Some(key), _, _) => AuthConfig::ApiKey {
                    key: SecretString::from(key),
                },
                (None, Some(username), Some(password)) => AuthConfig::Basic {
                    username,
                    password: SecretString::from(password),
                },
                _ => AuthConfig::None,
            };

            let mut registration = ServerRegistration::new(&name, endpoint).with_auth(auth);
            registration.validate()?;

            // Attempt a connection so the persisted record carries a real
            // status, but keep unreachable servers registered.
            let registry = ServerRegistry::new(config.remote.clone());
            let id = registry.add_server(registration.clone()).await?;
            if let Some(summary) = registry
                .list_servers()
                .await
                .into_iter()
                .find(|s| s.id == id)
            {
                registration.status = summary.status;
            }

            let mut file = load_servers_from(path).await?;
            file.upsert(registration.clone());
            save_servers_to(&file, path).await?;

            println!("registered '{name}' ({})", registration.status);
            if registration.status == ServerStatus::Unreachable {
                eprintln!("warning: initial connection failed; the server stays registered and is retried on use");
            }
        }

        ServerCommand::Remove { name } => {
            let mut file = load_servers_from(path).await?;
            let id = match file.get(&name) {
                Some(reg) => reg.id,
                None => anyhow::bail!("server '{name}' is not registered"),
            };
            file.remove(id);
            save_servers_to(&file, path).await?;
            println!("removed '{name}'");
        }

        ServerCommand::List => {
            let file = load_servers_from(path).await?;
            if file.servers.is_empty() {
                println!("no servers registered");
                return Ok(());
            }
            for server in &file.servers {
                let auth = if server.auth.is_configured() {
                    "auth"
                } else {
                    "no auth"
                };
                println!(
                    "  {} {} ({}, {})",
                    server.name, server.endpoint, server.status, auth
                );
            }
        }

        ServerCommand::Test { name } => {
            let file = load_servers_from(path).await?;
            let registration = file
                .get(&name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("server '{name}' is not registered"))?;

            let registry = ServerRegistry::new(config.remote.clone());
            registry.add_server(registration).await?;
            if registry.reachable_count().await == 0 {
                anyhow::bail!("server '{name}' is unreachable");
            }

            let tools = registry.list_all_tools().await;
            println!("'{name}' is reachable, {} tools:", tools.len());
            for desc in tools {
                println!("  {} - {}", desc.name, desc.description);
            }
        }
    }

    Ok(())
}
