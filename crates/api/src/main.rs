use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use easyvideo_api::background;
use easyvideo_api::config::ServerConfig;
use easyvideo_api::engine::{OrchestratorConfig, TaskOrchestrator};
use easyvideo_api::router::build_app_router;
use easyvideo_api::state::AppState;
use easyvideo_events::TaskBroadcaster;
use easyvideo_genclient::{GenerationApi, GenerationService};
use easyvideo_store::{ProjectStore, TaskLog, TaskStore};

/// Per-task event buffer; a stream further behind than this resyncs.
const BROADCAST_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "easyvideo_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env()?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Stores ---
    let store = Arc::new(TaskStore::new());
    let task_log = Arc::new(TaskLog::new(config.task_log_dir()));
    let projects = Arc::new(ProjectStore::new(&config.projects_dir));
    tracing::info!(
        task_log = %task_log.dir().display(),
        projects = %config.projects_dir.display(),
        "Stores ready",
    );

    // --- Generation service ---
    let service: Arc<dyn GenerationService> = Arc::new(GenerationApi::new(
        &config.generation_service_url,
        Duration::from_secs(config.submit_timeout_secs),
        Duration::from_secs(config.poll_timeout_secs),
    )?);
    tracing::info!(url = %config.generation_service_url, "Generation service client created");

    // --- Orchestrator ---
    let broadcaster = TaskBroadcaster::new(BROADCAST_CAPACITY);
    let orchestrator = TaskOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&broadcaster),
        service,
        Arc::clone(&task_log),
        projects,
        OrchestratorConfig {
            poll_interval: config.poll_interval(),
            output_dir: config.output_dir.clone(),
        },
    );

    // --- Retention sweeper ---
    let sweeper_cancel = tokio_util::sync::CancellationToken::new();
    let sweeper_handle = tokio::spawn(background::retention::run(
        Arc::clone(&store),
        config.task_retention(),
        config.sweep_interval(),
        sweeper_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        broadcaster,
        task_log,
        orchestrator: Arc::clone(&orchestrator),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(config.host.parse()?, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(shutdown_timeout, orchestrator.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("Task orchestrator did not shut down in time");
    }

    sweeper_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweeper_handle).await;
    tracing::info!("Retention sweeper stopped");

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix). If a handler cannot
/// be installed, that signal source is ignored and the other still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
