//! Patchbay Daemon - audio pipeline apply service.
//!
//! This is the main entry point for the Patchbay daemon, which stores audio
//! routing pipelines, validates them and applies them to the PulseAudio server
//! on request from IPC clients.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod blocking;
mod config;
mod discovery;
mod server;
mod signals;
mod worker;

#[cfg(test)]
mod testing;

use patchbay_core::{BackendPlugin, ManagerRegistry, OrchestratorOptions};
use patchbay_db::Database;
use patchbay_ipc::{ErrorInfo, IpcServer, Response, socket_path};
use patchbay_pulse::PulsePlugin;

use crate::blocking::BlockingHandler;
use crate::server::{Command, RequestHandler};
use crate::worker::{JobRunner, WorkerPool};

/// Failure recorded for a job the worker pool never received.
const QUEUE_GONE: &str = "Worker pool is not accepting jobs";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration before logging so the configured level applies
    let config = config::load_config()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("patchbay={}", config.daemon.log_level)))
        .context("Invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Patchbay daemon");

    // Open database
    let db_path = match &config.database.path {
        Some(path) => path.clone(),
        None => Database::default_path().context("Failed to determine database path")?,
    };
    let db = Database::open_at(&db_path).context("Failed to open database")?;
    info!(?db_path, pipelines = db.list_pipelines()?.len(), "Database initialized");

    // Register backend plugins
    let plugins: Vec<Box<dyn BackendPlugin>> =
        vec![Box::new(PulsePlugin::with_pactl().context("Failed to set up PulseAudio plugin")?)];
    let mut registry = ManagerRegistry::new();
    for plugin in &plugins {
        plugin.register(&mut registry).with_context(|| format!("Failed to register plugin {}", plugin.name()))?;
    }
    let registry = Arc::new(registry);
    info!(node_types = registry.len(), "Node types registered");

    // Bind the IPC socket
    let socket = config.ipc.socket_path.clone().unwrap_or_else(socket_path);
    let (ipc_server, mut request_rx) = IpcServer::bind(&socket).await.context("Failed to start IPC server")?;
    let ipc_server = Arc::new(ipc_server);
    let event_tx = ipc_server.event_sender();

    let shutdown = CancellationToken::new();
    signals::setup_signal_handlers(&shutdown);

    // Start the worker pool
    let options = OrchestratorOptions { validate_before_run: config.apply.validate_before_run };
    let runner = Arc::new(JobRunner::new(db_path.clone(), Arc::clone(&registry), options, event_tx.clone()));
    let pool = WorkerPool::spawn(config.workers.effective_count(), runner, &shutdown);
    let job_tx = pool.sender();

    // Pick up jobs left behind by the previous run
    let recovered = worker::recover_jobs(&db, &event_tx).context("Failed to recover unfinished jobs")?;
    if !recovered.is_empty() {
        info!(count = recovered.len(), "Requeueing unfinished jobs");
    }
    for message in recovered {
        if job_tx.send(message).await.is_err() {
            db.fail_job(message.job_id, QUEUE_GONE).context("Failed to record unqueued job")?;
        }
    }

    let backends: Vec<_> = plugins.iter().filter_map(|p| p.backend()).collect();
    let backend_names = backends.iter().map(|b| b.name().to_string()).collect();
    let blocking =
        Arc::new(BlockingHandler::new(db_path.clone(), Arc::clone(&registry), backends.clone(), event_tx.clone()));

    // Start device discovery
    let discovery_handle = if config.discovery.interval_secs > 0 {
        Some(tokio::spawn(discovery::run(
            db_path,
            backends,
            Duration::from_secs(config.discovery.interval_secs),
            event_tx,
            shutdown.clone(),
        )))
    } else {
        info!("Device discovery disabled");
        None
    };

    // Start IPC server
    let ipc_handle = {
        let ipc_server = Arc::clone(&ipc_server);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { ipc_server.run(shutdown).await })
    };
    info!(?socket, "Daemon running");

    let handler = RequestHandler::new(db, registry, backend_names);

    // Main event loop
    loop {
        tokio::select! {
            // Handle IPC requests
            Some((client_id, request, response_tx)) = request_rx.recv() => {
                debug!(client_id, request_id = request.id, "Handling IPC request");

                let handle_result = handler.handle_request(&request.method);
                if let Some(result) = handle_result.response {
                    let response = Response { id: request.id, result };
                    if response_tx.send(response).await.is_err() {
                        debug!(client_id, "Client went away before the response");
                    }
                }

                // Process command if one was returned
                match handle_result.command {
                    Some(Command::Enqueue(message)) => {
                        if job_tx.send(message).await.is_err() {
                            error!(job_id = message.job_id, "Worker pool is gone, job was not queued");
                            handler.abandon_job(message, QUEUE_GONE);
                        }
                    }
                    Some(Command::Offload(task)) => {
                        let blocking = Arc::clone(&blocking);
                        let id = request.id;
                        tokio::spawn(async move {
                            let result = match tokio::task::spawn_blocking(move || blocking.handle(task)).await {
                                Ok(result) => result,
                                Err(e) => Err(ErrorInfo::new(ErrorInfo::INTERNAL, format!("Request task failed: {e}"))),
                            };
                            if response_tx.send(Response { id, result }).await.is_err() {
                                debug!(client_id, "Client went away before the response");
                            }
                        });
                    }
                    Some(Command::Shutdown) => {
                        info!("Shutdown command processed");
                        break;
                    }
                    None => {}
                }
            }

            // Handle shutdown signal
            () = shutdown.cancelled() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // Cleanup
    info!("Shutting down...");
    shutdown.cancel();
    drop(job_tx);
    pool.join().await;
    if let Some(handle) = discovery_handle
        && let Err(e) = handle.await
    {
        warn!(error = %e, "Discovery task failed");
    }
    if let Err(e) = ipc_handle.await {
        warn!(error = %e, "IPC task failed");
    }
    if let Err(e) = std::fs::remove_file(&socket) {
        debug!(error = %e, "Could not remove socket file");
    }

    info!("Patchbay daemon stopped");
    Ok(())
}
