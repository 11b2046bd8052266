//! Worker entry point.

use doc_store::{InMemoryDocumentStore, PostgresDocumentStore};
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use worker::config::WorkerConfig;
use worker::error::Result;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(%error, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = WorkerConfig::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus exporter with its own HTTP listener
    PrometheusBuilder::new()
        .with_http_listener(config.metrics_addr())
        .install()?;
    tracing::info!(addr = %config.metrics_addr(), "metrics exporter listening");

    // 3. Pick the store and run until a signal arrives
    let polls = match &config.database_url {
        Some(url) => {
            // one connection per concurrent dispatch plus one for polling
            let pool = PgPoolOptions::new()
                .max_connections(config.engine.max_concurrent_dispatches as u32 + 1)
                .connect(url)
                .await?;
            let store = PostgresDocumentStore::new(pool);
            store.run_migrations().await?;
            tracing::info!("connected to postgres, migrations applied");
            worker::serve(store, &config, shutdown_signal()).await?
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running on an in-memory store");
            worker::serve(InMemoryDocumentStore::new(), &config, shutdown_signal()).await?
        }
    };

    tracing::info!(polls, "worker shut down gracefully");
    Ok(())
}
