//! Worker configuration loaded from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use engine::EngineConfig;

/// Worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `DATABASE_URL` — Postgres connection string; unset runs on an in-memory
///   store (default: unset)
/// - `WORKER_POLL_INTERVAL_MS` — pause between polls (default: `1000`)
/// - `WORKER_BATCH_SIZE` — pending events dispatched per poll (default: `50`)
/// - `METRICS_PORT` — Prometheus listener port (default: `9000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
///
/// The dispatcher's own settings come from [`EngineConfig::from_env`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: Option<String>,
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub metrics_port: u16,
    pub log_level: String,
    pub engine: EngineConfig,
}

impl WorkerConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            poll_interval: std::env::var("WORKER_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            batch_size: std::env::var("WORKER_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.batch_size),
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.metrics_port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            engine: EngineConfig::from_env(),
        }
    }

    /// Returns the address the Prometheus exporter listens on.
    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.metrics_port))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            poll_interval: Duration::from_millis(1000),
            batch_size: 50,
            metrics_port: 9000,
            log_level: "info".to_string(),
            engine: EngineConfig::default(),
        }
    }
}
