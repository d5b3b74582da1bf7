//! shoal-server: rendezvous server for a peer file-sharing network.
//!
//! Tracks which files each connected peer publishes, broadcasts catalog
//! changes in real time, and relays file requests and deliveries between
//! peers without storing any file content itself.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shoal_server::RelayServer;

#[derive(Parser, Debug)]
#[command(name = "shoal-server")]
#[command(about = "Presence-and-catalog relay for peer file sharing")]
struct Args {
    /// Address to listen on for peer connections
    #[arg(short, long, default_value = "0.0.0.0:5555")]
    listen: String,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Respects RUST_LOG, defaults to info (or debug with --verbose).
    let default_filter = if args.verbose {
        "debug,shoal_server=debug"
    } else {
        "info,shoal_server=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting shoal-server");

    let server = RelayServer::new();
    let listener = RelayServer::bind(&args.listen).await?;

    tokio::select! {
        _ = server.run(listener) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("Shutting down");
    Ok(())
}
