use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use game_core::JsonFileRoundSource;
use game_server::{GameServices, config::Config, network::GameServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting word group server...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Loading rounds from: {}", config.rounds_file.display());
    let source = match JsonFileRoundSource::open(&config.rounds_file, config.rounds_cycle) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to load rounds: {:#}", e);
            error!("Set ROUNDS_FILE to point to a JSON array of rounds.");
            std::process::exit(1);
        }
    };

    let services = GameServices::new(&config, Box::new(source));
    if let Some(round) = services.rounds.start_with_retry() {
        info!("First round {} is live", round.id());
    }

    let server = GameServer::bind(config.bind_addr()?, services.clone()).await?;
    let addr = server.local_addr()?;

    let shutdown = CancellationToken::new();
    let server_task = tokio::spawn(server.run(shutdown.clone()));

    info!(
        "Server started successfully on {} with {} workers. Press Ctrl+C to stop.",
        addr,
        services.worker_pool.size()
    );

    wait_for_signal().await;
    shutdown.cancel();

    if let Err(e) = server_task.await {
        error!("Accept loop ended abnormally: {}", e);
    }
    services.shutdown();
    info!("Server shutdown complete.");
    Ok(())
}

async fn wait_for_signal() {
    // Wait for SIGINT (Ctrl+C) or SIGTERM
    #[cfg(unix)]
    {
        let mut sigint = match signal::unix::signal(signal::unix::SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to install SIGINT handler: {}", e);
                let _ = signal::ctrl_c().await;
                return;
            }
        };
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
            return;
        }
        info!("Received Ctrl+C, shutting down gracefully...");
    }
}
