//! Hydra Bridge - cross-chain bridge transaction orchestrator
//!
//! Serves the lifecycle API: allowance checks, approvals, route selection and
//! bridge submission against the bridge backend, signed by a local wallet.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use hydra_bridge::allowance::AllowanceOracle;
use hydra_bridge::api::{self, AppState};
use hydra_bridge::backend::HttpBackend;
use hydra_bridge::builder::TransactionBuilder;
use hydra_bridge::chain::ChainManager;
use hydra_bridge::config::Settings;
use hydra_bridge::events::{BroadcastSink, FanoutSink, TracingSink};
use hydra_bridge::lifecycle::BridgeOrchestrator;
use hydra_bridge::metrics::MetricsServer;
use hydra_bridge::quote::QuoteRouter;
use hydra_bridge::registry::ChainAssetRegistry;
use hydra_bridge::state::StateManager;
use hydra_bridge::tx::WalletSigner;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Hydra Bridge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for instance {} with {} chains",
        settings.service.instance_id,
        settings.enabled_chains().len()
    );

    // Backend client and the services layered on it
    let backend = Arc::new(HttpBackend::new(&settings.backend)?);
    let registry = Arc::new(ChainAssetRegistry::new(backend.clone()));
    let oracle = Arc::new(AllowanceOracle::new(backend.clone()));
    let builder = Arc::new(TransactionBuilder::new(backend.clone()));
    let router = Arc::new(QuoteRouter::new(backend.clone()));

    // The refresh loop retries, so a backend outage at startup is not fatal
    if let Err(e) = registry.refresh().await {
        warn!("Initial catalog load failed: {}", e);
    }

    // Wallet signer over the configured chain RPCs
    let chain_manager = Arc::new(ChainManager::new(&settings)?);
    info!("Chain connections initialized: {:?}", chain_manager.connected_chains());

    let signer = Arc::new(
        WalletSigner::new(
            chain_manager.clone(),
            &settings.wallet,
            settings.lifecycle.receipt_poll_interval(),
        )
        .context("Failed to initialize wallet signer")?,
    );

    // Lifecycle events go to the log, the lifecycle board and subscribers
    let state_manager = Arc::new(StateManager::new());
    let broadcast = Arc::new(BroadcastSink::new(1024));
    let sink = FanoutSink::new()
        .with(Arc::new(TracingSink))
        .with(state_manager.clone())
        .with(broadcast.clone());

    let orchestrator = Arc::new(BridgeOrchestrator::new(
        registry.clone(),
        oracle.clone(),
        builder,
        router.clone(),
        signer,
        Arc::new(sink),
        settings.lifecycle.clone(),
    ));
    info!(
        "Orchestrator ready, signer {} approving {}",
        orchestrator.signer_address(),
        orchestrator.spender()
    );

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = AppState {
            orchestrator: orchestrator.clone(),
            registry: registry.clone(),
            oracle,
            router,
            state_manager: state_manager.clone(),
            chain_manager: Some(chain_manager.clone()),
        };
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Catalog refresh loop
    let refresh_handle = tokio::spawn({
        let registry = registry.clone();
        let interval = settings.registry.refresh_interval();
        async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = registry.refresh().await {
                    warn!("Catalog refresh failed: {}", e);
                }
            }
        }
    });

    // Retention pruning and chain health loop
    let maintenance_handle = tokio::spawn({
        let state_manager = state_manager.clone();
        let chain_manager = chain_manager.clone();
        let retention = Duration::from_secs(settings.lifecycle.lifecycle_retention_secs);
        async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;

                state_manager.prune_terminal(retention);

                for (chain_id, healthy) in chain_manager.health_check().await {
                    if !healthy {
                        warn!("Chain {} health check failed", chain_id);
                    }
                }
            }
        }
    });

    // Transition feed at debug level for operators following a single run
    let feed_handle = tokio::spawn({
        let mut events = broadcast.subscribe();
        async move {
            loop {
                match events.recv().await {
                    Ok(event) => tracing::debug!(
                        lifecycle = %event.lifecycle_id,
                        state = %event.state,
                        "Event published"
                    ),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event feed lagged, skipped {} events", skipped)
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    });

    info!("Hydra Bridge is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    let stats = state_manager.get_stats();
    if stats.active > 0 {
        warn!(
            "{} lifecycles still active at shutdown; submitted transactions may still confirm",
            stats.active
        );
    }

    // Abort background tasks
    api_handle.abort();
    refresh_handle.abort();
    maintenance_handle.abort();
    feed_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Hydra Bridge stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,hydra_bridge=debug,hyper=warn,reqwest=warn")
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

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
