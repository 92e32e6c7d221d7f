mod commands;
mod utils;

use clap::{Parser, Subcommand};
use commands::{Session, assign, needs_privilege, status};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "windsor-net")]
#[command(about = "Reconcile host and guest networking for a local context")]
struct Cli {
    /// Directory holding windsor.json (defaults to ~/.config/windsor)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Context name (defaults to the `context` config key, else "local")
    #[arg(long, global = true)]
    context: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign addresses to services, given as NAME or NAME:PORT
    Assign {
        #[arg(required = true)]
        services: Vec<String>,
    },
    /// Route the container network through the guest
    Route,
    /// Point the DNS domain at its resolver
    Dns,
    /// Enable forwarding from the host inside the guest VM
    Guest,
    /// Print whether the next reconcile needs elevated credentials
    NeedsPrivilege,
    /// Show the resolved network configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => dirs::home_dir()
            .map(|home| home.join(".config").join("windsor"))
            .ok_or("cannot determine the config directory; pass --config-dir")?,
    };
    let session = Session::open(&config_dir, cli.context)?;

    match cli.command {
        Commands::Assign { services } => assign(&session, &services)?,
        Commands::Route => session.manager.configure_host_route().await?,
        Commands::Dns => session.manager.configure_dns().await?,
        Commands::Guest => session.manager.configure_guest().await?,
        Commands::NeedsPrivilege => needs_privilege(&session).await,
        Commands::Status => status(&session)?,
    }

    Ok(())
}
