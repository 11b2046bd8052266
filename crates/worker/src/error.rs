use thiserror::Error;

/// Errors that stop the worker.
///
/// Failures of individual events never surface here; the dispatcher records
/// or logs them and the poll loop carries on.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Metrics exporter failed: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error(transparent)]
    Engine(#[from] engine::EngineError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
