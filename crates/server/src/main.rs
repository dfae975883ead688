mod api;
mod metrics;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use printsort_core::{
    load_config, validate_config, CommandInspector, Config, Correlator, DeviceLink,
    DeviceListener, FsUploader, Inspector, JobOrchestrator, JobStore, PollLoop, RestJobStore,
    SqliteJobStore, StepTimings, StorageUploader, Uploader,
};
use printsort_core::config::{StoreBackend, UploadBackend};

use api::create_router;
use state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("PRINTSORT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!(
        store = ?config.store.backend,
        upload = ?config.upload.backend,
        mismatch_policy = ?config.device.mismatch_policy,
        "Configuration loaded"
    );

    let store = create_store(&config)?;
    info!("Job store initialized ({})", store.name());

    let uploader = create_uploader(&config)?;
    info!("Uploader initialized ({})", uploader.name());

    let inspector: Arc<dyn Inspector> = Arc::new(CommandInspector::new(
        config.inspector.clone(),
        config.quality.clone(),
    ));

    // Robot controller link
    let (link, inbox) = DeviceLink::new();
    let correlator = Arc::new(Correlator::new(
        Arc::clone(&link),
        inbox,
        config.device.mismatch_policy,
    ));

    let device_addr = SocketAddr::new(config.device.host, config.device.port);
    let device_listener = DeviceListener::bind(device_addr, Arc::clone(&link))
        .await
        .with_context(|| format!("Failed to bind device listener to {}", device_addr))?;
    info!("Waiting for robot controller on {}", device_addr);

    let (device_shutdown_tx, device_shutdown_rx) = broadcast::channel(1);
    let listener_handle = tokio::spawn(device_listener.run(device_shutdown_rx));

    // Poll loop
    let poll_loop = if config.orchestrator.enabled {
        let orchestrator = Arc::new(JobOrchestrator::new(
            Arc::clone(&store),
            correlator,
            inspector,
            uploader,
            StepTimings::from_config(&config.orchestrator, &config.device),
        ));
        let poll_loop = Arc::new(PollLoop::new(
            config.orchestrator.clone(),
            Arc::clone(&store),
            Arc::clone(&link),
            orchestrator,
        ));
        poll_loop.start().await;
        Some(poll_loop)
    } else {
        info!("Orchestrator disabled in config");
        None
    };

    let state = Arc::new(AppState::new(
        config.clone(),
        store,
        Arc::clone(&link),
        poll_loop.clone(),
    ));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting status API on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    // Let an in-flight job finish before the link goes away.
    if let Some(ref poll_loop) = poll_loop {
        poll_loop.stop().await;
    }

    let _ = device_shutdown_tx.send(());
    if let Err(e) = listener_handle.await {
        warn!(error = %e, "Device listener task ended abnormally");
    }
    link.disconnect();

    info!("Shutdown complete");
    Ok(())
}

fn create_store(config: &Config) -> Result<Arc<dyn JobStore>> {
    let store: Arc<dyn JobStore> = match config.store.backend {
        StoreBackend::Sqlite => Arc::new(
            SqliteJobStore::new(&config.store.sqlite.path)
                .context("Failed to open SQLite job store")?,
        ),
        StoreBackend::Rest => {
            let rest = config
                .store
                .rest
                .clone()
                .context("REST store selected but [store.rest] is missing")?;
            Arc::new(RestJobStore::new(rest).context("Failed to create REST job store")?)
        }
    };
    Ok(store)
}

fn create_uploader(config: &Config) -> Result<Arc<dyn Uploader>> {
    let uploader: Arc<dyn Uploader> = match config.upload.backend {
        UploadBackend::Fs => Arc::new(FsUploader::new(config.upload.fs.dir.clone())),
        UploadBackend::Storage => {
            let storage = config
                .upload
                .storage
                .clone()
                .context("Storage upload selected but [upload.storage] is missing")?;
            Arc::new(StorageUploader::new(storage).context("Failed to create storage uploader")?)
        }
    };
    Ok(uploader)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
