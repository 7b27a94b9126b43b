use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courier_core::{
    create_provisioning_channel, load_config, validate_config, CompletionCheckers,
    DataFlowManager, DefaultManifestGenerator, FsFlowController, FsProvisioner, HttpDispatcher,
    JobStore, MarkerFileChecker, SqliteJobStore, TransferOrchestrator,
};
use courier_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

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

    info!("courier {} starting", VERSION);

    // Determine config path
    let config_path = std::env::var("COURIER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Initialize job store
    let store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(&config.database.path).context("Failed to open job store")?,
    );

    // Provisioning handoff: the writer applies provisioner responses to the store
    let (provision_handle, provision_writer) =
        create_provisioning_channel(store.clone(), config.provisioning.channel_buffer);
    let writer_handle = tokio::spawn(provision_writer.run());

    info!(
        "Provisioning local resources under {:?}",
        config.provisioning.root_dir
    );
    let provisioner = Arc::new(FsProvisioner::new(
        config.provisioning.root_dir.clone(),
        provision_handle,
    ));

    let dispatcher = Arc::new(
        HttpDispatcher::new(config.dispatch.timeout())
            .context("Failed to create remote dispatcher")?
            .with_callback_address(config.dispatch.callback_address.clone()),
    );
    if config.dispatch.callback_address.is_none() {
        warn!("No dispatch.callback_address set; peers cannot acknowledge transfers");
    }

    let mut flow = DataFlowManager::new();
    if config.flow.enabled {
        info!(
            "Local data flow copies from {:?} into {:?}",
            config.flow.source_root, config.flow.destination_root
        );
        flow.register(Arc::new(FsFlowController::new(
            store.clone(),
            config.flow.source_root.clone(),
            config.flow.destination_root.clone(),
        )));
    } else {
        info!("Local data flow disabled in config");
    }

    let checkers = CompletionCheckers::new()
        .with_checker(MarkerFileChecker::kind(), Arc::new(MarkerFileChecker::new()));

    let orchestrator = Arc::new(
        TransferOrchestrator::new(
            config.orchestrator.clone(),
            store.clone(),
            Arc::new(DefaultManifestGenerator),
            provisioner,
            dispatcher,
            Arc::new(flow),
        )
        .with_completion_checkers(checkers),
    );

    if config.orchestrator.enabled {
        info!("Starting transfer orchestrator");
        orchestrator.start().await;
    } else {
        info!("Orchestrator disabled in config");
    }

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        store,
        orchestrator.clone(),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Stopping orchestrator...");
    orchestrator.stop().await;
    info!("Orchestrator stopped");

    // The provisioner inside the orchestrator holds the last ProvisionHandle;
    // dropping it closes the channel so the writer drains and exits.
    drop(orchestrator);
    let _ = writer_handle.await;
    info!("Provisioning writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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

    info!("Shutdown signal received");
}
