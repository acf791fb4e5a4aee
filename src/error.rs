//! Error types for the worker
//!
//! Each failure category has its own error at the boundary where it occurs;
//! [`WorkerError`] collects the ones that reach process level. Decode and
//! processing errors never do: the subscription loop logs them and moves on.

use crate::broker::BrokerError;
use crate::config::ConfigError;
use crate::observability::HealthServerError;
use thiserror::Error;

/// Main error type for worker operations
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Health server error: {0}")]
    HealthServer(#[from] HealthServerError),

    #[error("Signal handling error: {0}")]
    Signal(#[from] std::io::Error),

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;
