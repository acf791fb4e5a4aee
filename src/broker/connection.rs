//! Connection manager and shared health state
//!
//! The manager opens exactly one broker session per process and publishes its
//! outcome into a write-once [`HealthState`] that the health server reads.

use super::{BrokerConnector, BrokerError, BrokerHandle, BrokerSession};
use crate::broker_span;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};

/// Outcome of the initial connection attempt
#[derive(Clone)]
pub enum ConnectionStatus {
    /// Connected and subscribed; the handle is used for probing
    Connected(Arc<dyn BrokerHandle>),
    /// Initial connection failed with reason
    Failed(String),
}

impl fmt::Debug for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected(_) => f.write_str("Connected"),
            ConnectionStatus::Failed(reason) => f.debug_tuple("Failed").field(reason).finish(),
        }
    }
}

/// Write-once connection health shared between the worker and the health server
///
/// Transitions are `unset -> Connected` or `unset -> Failed`; later writes are
/// rejected.
#[derive(Debug, Clone, Default)]
pub struct HealthState {
    status: Arc<OnceLock<ConnectionStatus>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the live handle. Returns false if the state was already set.
    pub fn mark_healthy(&self, handle: Arc<dyn BrokerHandle>) -> bool {
        self.publish(ConnectionStatus::Connected(handle))
    }

    /// Publish a failed initial connection. Returns false if already set.
    pub fn mark_unhealthy(&self, reason: impl Into<String>) -> bool {
        self.publish(ConnectionStatus::Failed(reason.into()))
    }

    fn publish(&self, status: ConnectionStatus) -> bool {
        match self.status.set(status) {
            Ok(()) => true,
            Err(rejected) => {
                warn!(
                    "Ignoring health state update {:?}: state already {:?}",
                    rejected,
                    self.status.get()
                );
                false
            }
        }
    }

    pub fn status(&self) -> Option<&ConnectionStatus> {
        self.status.get()
    }

    pub fn is_set(&self) -> bool {
        self.status.get().is_some()
    }

    /// True only after a successful initial connection
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.get(), Some(ConnectionStatus::Connected(_)))
    }

    pub fn handle(&self) -> Option<Arc<dyn BrokerHandle>> {
        match self.status.get() {
            Some(ConnectionStatus::Connected(handle)) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Probe the live handle if there is one
    pub async fn probe(&self, timeout: Duration) -> ProbeResult {
        match self.status.get() {
            Some(ConnectionStatus::Connected(handle)) => probe(handle.as_ref(), timeout).await,
            Some(ConnectionStatus::Failed(reason)) => ProbeResult::Dead(reason.clone()),
            None => ProbeResult::Dead("broker client not initialized".to_string()),
        }
    }
}

/// Result of a liveness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Alive,
    Dead(String),
}

impl ProbeResult {
    pub fn is_alive(&self) -> bool {
        matches!(self, ProbeResult::Alive)
    }
}

/// Ping the broker through `handle`, bounded by `timeout`
///
/// Never fails: errors and timeouts are reported as [`ProbeResult::Dead`].
pub async fn probe(handle: &dyn BrokerHandle, timeout: Duration) -> ProbeResult {
    let start = Instant::now();
    let result = match tokio::time::timeout(timeout, handle.ping()).await {
        Ok(Ok(())) => ProbeResult::Alive,
        Ok(Err(e)) => ProbeResult::Dead(e.to_string()),
        Err(_) => ProbeResult::Dead(
            BrokerError::PingTimeout(timeout.as_millis() as u64).to_string(),
        ),
    };

    debug!(
        "Broker probe: alive={}, response_time={}ms",
        result.is_alive(),
        start.elapsed().as_millis()
    );
    result
}

/// Opens the single broker session of the process and records the outcome
pub struct ConnectionManager<C: BrokerConnector> {
    connector: C,
    state: HealthState,
}

impl<C: BrokerConnector> ConnectionManager<C> {
    pub fn new(connector: C, state: HealthState) -> Self {
        Self { connector, state }
    }

    pub fn state(&self) -> &HealthState {
        &self.state
    }

    /// Connect once and subscribe to `channel`
    ///
    /// Success marks the state healthy; failure marks it unhealthy. There is
    /// no retry.
    pub async fn connect(&self, channel: &str) -> Result<BrokerSession, BrokerError> {
        let address = self.connector.address();
        let span = broker_span!(operation = "connect", address = %address, channel = %channel);

        async {
            if self.state.is_set() {
                return Err(BrokerError::ConnectionFailed(
                    "broker connection already initialized".to_string(),
                ));
            }

            match self.connector.connect(channel).await {
                Ok(session) => {
                    self.state.mark_healthy(session.handle.clone());
                    info!("Connected to Redis successfully");
                    Ok(session)
                }
                Err(e) => {
                    error!("Failed to connect to Redis: {}", e);
                    self.state.mark_unhealthy(e.to_string());
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}
