use anyhow::Context;
use clap::{Parser, Subcommand};
use configuration::{Config, init_tracing, load_config};
use core_types::SlotId;
use orchestrator::{ConfigCredentialStore, TradingService};
use remote_session::RemoteSession;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// The main entry point for the MT5 fleet manager.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real environment variables take precedence.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config().context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config.logging)?;

    let service = build_service(&config);
    service.connect().await.context("Failed to connect to the VPS")?;

    let result = run(cli.command, &service, &config).await;
    service.shutdown().await;
    result
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Runs MetaTrader 5 terminals in Docker containers on a remote VPS.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and monitor running terminals.
    Serve {
        /// Overrides `[server].bind_addr`.
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Start a terminal for a configured user on the lowest free slot.
    StartTrading {
        user_id: String,
    },
    /// Print the lowest slot with no running container.
    FindSlot,
    /// Print the state of one slot.
    Status {
        slot: SlotId,
    },
    /// Stop the terminal and container in a slot.
    Stop {
        slot: SlotId,
        /// Only kill the terminal process and leave the container running.
        #[arg(long)]
        terminal_only: bool,
    },
    /// Probe a slot's upstream connection once.
    Check {
        slot: SlotId,
    },
    /// Select the active trading pair in a slot.
    SetPair {
        slot: SlotId,
        pair: String,
    },
}

fn build_service(config: &Config) -> Arc<TradingService> {
    let session = Arc::new(RemoteSession::new(config.vps.clone()));
    let store = Arc::new(ConfigCredentialStore::from_env(&config.users));
    Arc::new(TradingService::new(session, store, &config.orchestrator))
}

async fn run(command: Commands, service: &Arc<TradingService>, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Serve { addr } => {
            let addr = addr.unwrap_or(config.server.bind_addr);
            service.start_monitor();
            tokio::select! {
                result = web_server::run_server(service.clone(), addr) => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received."),
            }
        }
        Commands::StartTrading { user_id } => {
            let outcome = service.start_trading(&user_id).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.success {
                anyhow::bail!(outcome.message);
            }
        }
        Commands::FindSlot => {
            let slot = service.available_slot().await?;
            println!("{}", json!({ "slot": slot }));
        }
        Commands::Status { slot } => {
            let status = service.instance_status(slot).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Stop { slot, terminal_only } => {
            if terminal_only {
                service.stop_terminal(slot).await?;
            } else {
                service.stop_trading(slot).await?;
            }
            println!("{}", json!({ "slot": slot, "stopped": true }));
        }
        Commands::Check { slot } => {
            let connected = service.check_connection(slot).await?;
            println!("{}", json!({ "slot": slot, "connected": connected }));
        }
        Commands::SetPair { slot, pair } => {
            service.set_pair(slot, &pair).await?;
            println!("{}", json!({ "slot": slot, "pair": pair }));
        }
    }
    Ok(())
}
