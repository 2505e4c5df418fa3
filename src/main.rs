use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{error, info};

mod agent;
mod api;
mod config;
mod error;
mod flows;
mod logging;
mod protocol;
mod state;
#[cfg(test)]
mod test_utils;
mod web;

use config::{AppConfig, ServerConfig};

/// Bank front end and identity-verification front end for the redirect protocol
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the client app and the verification app (default)
    Serve,
    /// Call-center agent console
    Agent {
        #[arg(long, short = 'u')]
        username: String,
        /// Falls back to AGENT_PASSWORD
        #[arg(long, short = 'p', env = "AGENT_PASSWORD", hide_env_values = true)]
        password: String,
        #[command(subcommand)]
        action: agent::AgentAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    logging::init_tracing("info");

    let config = AppConfig::from_env()?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let server = ServerConfig::from_env();
            info!(
                "Starting client app on port {} and verification app on port {}",
                server.client_port, server.verifier_port
            );
            if let Err(e) = web::start_servers(server, config).await {
                error!("Server error: {}", e);
                return Err(e);
            }
        }
        Command::Agent {
            username,
            password,
            action,
        } => {
            if let Err(e) = agent::run(&config, &username, &password, action).await {
                error!("Agent console failed: {}", e);
                return Err(anyhow::anyhow!(e.user_message()));
            }
        }
    }

    Ok(())
}
