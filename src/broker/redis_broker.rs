//! Redis implementation of the broker traits
//!
//! Subscriptions use a dedicated pub/sub connection; probes go over a separate
//! multiplexed connection because a subscribed connection only accepts
//! pub/sub commands.

use super::{BrokerConnector, BrokerError, BrokerHandle, BrokerSession, EventKind, InboundEvent};
use crate::config::BrokerSection;
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the connection URL for a broker section (database 0)
pub fn redis_url(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("redis://[{host}]:{port}/0")
    } else {
        format!("redis://{host}:{port}/0")
    }
}

/// Map a pub/sub message into an inbound event
pub fn event_from_msg(msg: &redis::Msg) -> InboundEvent {
    let kind = if msg.from_pattern() {
        EventKind::PatternMessage
    } else {
        EventKind::Message
    };
    InboundEvent {
        kind,
        channel: msg.get_channel_name().to_string(),
        payload: msg.get_payload_bytes().to_vec(),
    }
}

/// Opens Redis pub/sub sessions
#[derive(Debug, Clone)]
pub struct RedisConnector {
    url: String,
    connect_timeout: Duration,
}

impl RedisConnector {
    pub fn new(section: &BrokerSection) -> Self {
        Self {
            url: redis_url(&section.host, section.port),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn open(&self, channel: &str) -> Result<BrokerSession, BrokerError> {
        let client = redis::Client::open(self.url.as_str())
            .map_err(|e| BrokerError::ConnectionFailed(format!("invalid broker address: {e}")))?;

        let mut pubsub = client.get_async_pubsub().await?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| BrokerError::SubscriptionFailed {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;
        debug!("Subscribed to channel {}", channel);

        let connection = client.get_multiplexed_async_connection().await?;

        let events = pubsub
            .into_on_message()
            .map(|msg| Ok(event_from_msg(&msg)))
            .boxed();

        Ok(BrokerSession {
            handle: Arc::new(RedisHandle { connection }),
            events,
        })
    }
}

#[async_trait]
impl BrokerConnector for RedisConnector {
    async fn connect(&self, channel: &str) -> Result<BrokerSession, BrokerError> {
        match tokio::time::timeout(self.connect_timeout, self.open(channel)).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::ConnectionFailed(format!(
                "timed out after {}ms connecting to {}",
                self.connect_timeout.as_millis(),
                self.url
            ))),
        }
    }

    fn address(&self) -> String {
        self.url.clone()
    }
}

/// Probe handle backed by a multiplexed Redis connection
#[derive(Clone)]
pub struct RedisHandle {
    connection: MultiplexedConnection,
}

#[async_trait]
impl BrokerHandle for RedisHandle {
    async fn ping(&self) -> Result<(), BrokerError> {
        let mut connection = self.connection.clone();
        let reply: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|e| BrokerError::PingFailed(e.to_string()))?;

        if reply == "PONG" {
            Ok(())
        } else {
            Err(BrokerError::PingFailed(format!("unexpected reply: {reply}")))
        }
    }
}
