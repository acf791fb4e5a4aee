//! Broker abstraction for the pub/sub worker
//!
//! The worker talks to its broker through two small traits so the connection
//! lifecycle, the subscription loop and the health probe can be exercised
//! without a running Redis.
//!
//! # Architecture
//!
//! - [`connection`] - connection manager and the write-once health state
//! - [`redis_broker`] - Redis implementation of the broker traits
//!
//! # Usage
//!
//! ```rust,no_run
//! use log_message_processor::broker::{ConnectionManager, HealthState, RedisConnector};
//! use log_message_processor::config::BrokerSection;
//!
//! # tokio_test::block_on(async {
//! let section = BrokerSection {
//!     host: "localhost".to_string(),
//!     port: 6379,
//!     channel: "log_channel".to_string(),
//! };
//!
//! let state = HealthState::new();
//! let manager = ConnectionManager::new(RedisConnector::new(&section), state.clone());
//! let session = manager.connect(&section.channel).await?;
//! assert!(state.is_healthy());
//! # drop(session);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod connection;
pub mod redis_broker;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use connection::{ConnectionManager, ConnectionStatus, HealthState, ProbeResult};
pub use redis_broker::{RedisConnector, RedisHandle};

/// Broker transport errors
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Subscription to channel '{channel}' failed: {reason}")]
    SubscriptionFailed { channel: String, reason: String },
    #[error("Ping failed: {0}")]
    PingFailed(String),
    #[error("Ping timed out after {0}ms")]
    PingTimeout(u64),
    /// Error item yielded by the event stream. The Redis stream yields bare
    /// messages, so over Redis a dropped subscription only ever shows up as
    /// the end of the stream.
    #[error("Subscription stream error: {0}")]
    Stream(String),
}

impl From<redis::RedisError> for BrokerError {
    fn from(err: redis::RedisError) -> Self {
        BrokerError::ConnectionFailed(err.to_string())
    }
}

/// Kind marker carried by every inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Subscription confirmation
    Subscribe,
    /// Unsubscription confirmation
    Unsubscribe,
    /// Data message published on a subscribed channel
    Message,
    /// Data message delivered through a pattern subscription
    PatternMessage,
    /// Any other control notification
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Subscribe => "subscribe",
            EventKind::Unsubscribe => "unsubscribe",
            EventKind::Message => "message",
            EventKind::PatternMessage => "pmessage",
            EventKind::Other(kind) => kind,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item delivered by the subscription stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub kind: EventKind,
    pub channel: String,
    pub payload: Vec<u8>,
}

impl InboundEvent {
    pub fn message(channel: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: EventKind::Message,
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    pub fn control(kind: EventKind, channel: impl Into<String>) -> Self {
        Self {
            kind,
            channel: channel.into(),
            payload: Vec::new(),
        }
    }
}

/// Lazy, potentially infinite sequence of inbound events
pub type EventStream = BoxStream<'static, Result<InboundEvent, BrokerError>>;

/// Live handle on an open broker session
#[async_trait]
pub trait BrokerHandle: Send + Sync {
    /// Round-trip liveness check against the broker
    async fn ping(&self) -> Result<(), BrokerError>;
}

/// An open session: the probe handle plus the channel's event stream
pub struct BrokerSession {
    pub handle: Arc<dyn BrokerHandle>,
    pub events: EventStream,
}

impl fmt::Debug for BrokerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerSession").finish_non_exhaustive()
    }
}

/// Factory that opens a session on a broker
///
/// Implemented by [`RedisConnector`] in production and by
/// `testing::mocks::MockConnector` in tests.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Open a connection and subscribe to `channel`
    async fn connect(&self, channel: &str) -> Result<BrokerSession, BrokerError>;

    /// Human-readable broker address for logging
    fn address(&self) -> String;
}
