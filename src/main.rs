//! Log Message Processor - Main Entry Point
//!
//! Starts the health server, then the pub/sub worker, and supervises both
//! until a termination signal arrives.

use log_message_processor::broker::{HealthState, RedisConnector};
use log_message_processor::config::WorkerConfig;
use log_message_processor::observability::{init_default_logging, HealthServer};
use log_message_processor::processor::MessageProcessor;
use log_message_processor::worker::Worker;
use log_message_processor::WorkerResult;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize observability system
    init_default_logging();

    info!(
        "Starting log message processor v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration
    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!("Worker failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

async fn run(config: WorkerConfig) -> WorkerResult<()> {
    let state = HealthState::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Health server first so the broker state is observable from the start
    let health_server = Arc::new(HealthServer::new(&config.health, state.clone()));
    let (_, mut health_task) = health_server.start(shutdown_rx.clone())?;

    let worker = Worker::new(
        RedisConnector::new(&config.broker),
        config.broker.channel.clone(),
        state,
        MessageProcessor::from_section(&config.processing),
    );
    let worker_shutdown = shutdown_rx.clone();
    let mut worker_task = tokio::spawn(async move { worker.run(worker_shutdown).await });

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    let exited = tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down...");
            None
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
            None
        }
        result = &mut health_task => Some(("Health server", result)),
        result = &mut worker_task => Some(("Worker", result)),
    };

    // Both tasks watch this signal; a send error only means they are gone.
    let _ = shutdown_tx.send(true);

    match exited {
        None => {
            if let Err(e) = worker_task.await {
                error!("Worker task failed: {}", e);
            }
            if let Err(e) = health_task.await {
                error!("Health server task failed: {}", e);
            }
        }
        Some((name, result)) => {
            warn!("{} stopped unexpectedly", name);
            worker_task.abort();
            health_task.abort();
            result?;
        }
    }

    Ok(())
}
