use thiserror::Error;

/// Errors surfaced by the work manager.
#[derive(Debug, Error)]
pub enum WorkError {
    #[error("No worker registered under name: {0}")]
    UnknownWorker(String),

    #[error("No work enqueued under name: {0}")]
    NotFound(String),

    #[error("Work is already running: {0}")]
    AlreadyRunning(String),

    #[error("Invalid work request: {0}")]
    InvalidRequest(String),

    #[error("Work scheduler is not available")]
    SchedulerUnavailable,

    #[error("Work store error: {0}")]
    Store(#[from] anyhow::Error),
}
