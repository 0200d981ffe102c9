// file: src/main.rs
// version: 1.1.0
// guid: 1c5e83a7-f2d9-4b60-a418-6d07c9e52bf3

//! kubei - Main entry point

use clap::Parser;
use kubei::{
    cli::{args::Cli, args::Commands, commands::*},
    logging::logger,
    Result,
};
use tokio::signal;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    logger::init_logger(cli.verbose, cli.quiet)?;

    // Set up signal handling for graceful shutdown
    let shutdown_signal = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        warn!("Received Ctrl+C, aborting; nodes may be left partially configured");
    };

    let command_future = async {
        match cli.command {
            Commands::Init {
                connection,
                kubernetes_version,
                container_engine_version,
                control_plane_endpoint,
                image_repository,
                pod_network_cidr,
                service_cidr,
                network_plugin,
                offline_file,
            } => {
                init_command(
                    connection,
                    kubernetes_version,
                    container_engine_version,
                    control_plane_endpoint,
                    image_repository,
                    pod_network_cidr,
                    service_cidr,
                    network_plugin,
                    offline_file,
                )
                .await
            }
            Commands::Reset {
                connection,
                remove_kubernetes_component,
                remove_container_engine,
                control_plane_endpoint,
            } => {
                reset_command(
                    connection,
                    remove_kubernetes_component,
                    remove_container_engine,
                    control_plane_endpoint,
                )
                .await
            }
        }
    };

    // Run command with signal handling
    tokio::select! {
        result = command_future => result,
        _ = shutdown_signal => {
            std::process::exit(130); // Standard exit code for Ctrl+C
        }
    }
}
