//! Observability for the worker
//!
//! Structured logging and the HTTP health endpoint used by container
//! orchestration.

pub mod health;
pub mod logging;

// Re-export for convenience
pub use health::{
    HealthResponse, HealthServer, HealthServerError, BROKER_FAILURE_MESSAGE, HEALTH_PATH,
};
pub use logging::{init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{broker_span, message_span};
