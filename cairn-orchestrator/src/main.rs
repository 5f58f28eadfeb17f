use anyhow::{Context, Result};
use cairn_client::{HttpWorkerClient, WorkerApi};
use clap::Parser;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod gc;
pub mod lease;
pub mod metric;
pub mod repository;
pub mod tracker;

use config::{Cli, Config, StoreBackend};
use gc::{Collector, ContainerReaper, FleetReporter, VolumeReaper};
use lease::{LeaseManager, MemoryLeaseManager, PgLeaseManager};
use metric::slow_query::SlowQueryMonitor;
use metric::{Emitter, LogSink, MemorySink, Telemetry};
use tracker::{MemoryResourceTracker, PgResourceTracker, ResourceTracker};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cairn_orchestrator=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_cli(Cli::parse())?;

    tracing::info!(
        "Starting Cairn Orchestrator (holder {}, auth: {})",
        config.holder_id,
        config.auth.name()
    );

    let recent = Arc::new(MemorySink::new(config.recent_events));
    let emitter = Emitter::new()
        .with_sink(Arc::new(LogSink))
        .with_sink(recent.clone());
    let telemetry = Telemetry::new(emitter);

    let (tracker, leases, databases) = open_store(&config, &telemetry).await?;

    let workers: Arc<dyn WorkerApi> = Arc::new(
        HttpWorkerClient::new(config.delete_timeout).context("Failed to build worker client")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks: Vec<JoinHandle<()>> = vec![
        tokio::spawn(
            Collector::new(
                Arc::new(ContainerReaper::new(workers.clone())),
                tracker.clone(),
                leases.clone(),
                telemetry.clone(),
                config.container_collector(),
            )
            .run(shutdown_rx.clone()),
        ),
        tokio::spawn(
            Collector::new(
                Arc::new(VolumeReaper::new(workers)),
                tracker.clone(),
                leases,
                telemetry.clone(),
                config.volume_collector(),
            )
            .run(shutdown_rx.clone()),
        ),
        tokio::spawn(
            FleetReporter::new(
                tracker.clone(),
                telemetry.clone(),
                config.fleet_report_interval,
            )
            .run(shutdown_rx.clone()),
        ),
        tokio::spawn(
            SlowQueryMonitor::new(databases, telemetry.clone(), config.slow_query_interval)
                .run(shutdown_rx),
        ),
    ];

    // Build router with all API endpoints
    let app = api::create_router(api::AppState {
        tracker,
        telemetry,
        recent,
        auth: Arc::new(config.auth.clone()),
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Stopping background tasks");
    // receivers may already be gone if every task exited
    let _ = shutdown_tx.send(true);

    let drain = async {
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!("Background task panicked: {}", e);
            }
        }
    };
    if tokio::time::timeout(config.shutdown_grace, drain)
        .await
        .is_err()
    {
        tracing::warn!(
            "Background tasks did not stop within {:?}",
            config.shutdown_grace
        );
    }

    Ok(())
}

type Store = (Arc<dyn ResourceTracker>, Arc<dyn LeaseManager>, Vec<PgPool>);

/// Opens the configured state backend
///
/// The returned databases feed the slow-query diagnostic; the memory
/// backend has none.
async fn open_store(config: &Config, telemetry: &Telemetry) -> Result<Store> {
    match config.store {
        StoreBackend::Postgres => {
            tracing::info!("Connecting to database...");

            let pool = db::create_pool(&config.database_url)
                .await
                .context("Failed to create database pool")?;

            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            let tracker = PgResourceTracker::new(
                pool.clone(),
                config.reap_policy(),
                Arc::clone(&telemetry.meters),
            );

            Ok((
                Arc::new(tracker),
                Arc::new(PgLeaseManager::new(pool.clone())),
                vec![pool],
            ))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; state is neither shared nor persisted");

            let tracker =
                MemoryResourceTracker::new(config.reap_policy(), Arc::clone(&telemetry.meters));

            Ok((
                Arc::new(tracker),
                Arc::new(MemoryLeaseManager::new()),
                Vec::new(),
            ))
        }
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = terminate_signal();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received");
}

/// Installs the SIGTERM handler immediately; the returned future resolves
/// on the first delivery
#[cfg(unix)]
fn terminate_signal() -> impl std::future::Future<Output = ()> {
    use tokio::signal::unix::{SignalKind, signal};

    let sigterm = signal(SignalKind::terminate());
    async move {
        match sigterm {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}
