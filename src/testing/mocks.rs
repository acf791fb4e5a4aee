//! Mock implementations for testing
//!
//! Provides a mock broker connector and probe handle so the worker, the
//! subscription loop and the health server can be exercised without Redis.

use crate::broker::{
    BrokerConnector, BrokerError, BrokerHandle, BrokerSession, EventStream, InboundEvent,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Mock probe handle with a switchable ping result
#[derive(Debug)]
pub struct MockHandle {
    alive: AtomicBool,
    ping_delay: Duration,
    ping_count: AtomicUsize,
}

impl MockHandle {
    pub fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            ping_delay: Duration::ZERO,
            ping_count: AtomicUsize::new(0),
        }
    }

    /// Make every ping take `delay` before answering
    pub fn with_ping_delay(mut self, delay: Duration) -> Self {
        self.ping_delay = delay;
        self
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn ping_count(&self) -> usize {
        self.ping_count.load(Ordering::SeqCst)
    }
}

impl Default for MockHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerHandle for MockHandle {
    async fn ping(&self) -> Result<(), BrokerError> {
        self.ping_count.fetch_add(1, Ordering::SeqCst);
        if !self.ping_delay.is_zero() {
            tokio::time::sleep(self.ping_delay).await;
        }
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::PingFailed("Mock ping failure".to_string()))
        }
    }
}

enum EventSource {
    Scripted {
        events: Vec<InboundEvent>,
        keep_open: bool,
    },
    Live(mpsc::UnboundedReceiver<InboundEvent>),
}

impl EventSource {
    fn into_stream(self) -> EventStream {
        match self {
            EventSource::Scripted { events, keep_open } => {
                let scripted = stream::iter(events.into_iter().map(Ok));
                if keep_open {
                    scripted.chain(stream::pending()).boxed()
                } else {
                    scripted.boxed()
                }
            }
            EventSource::Live(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (Ok(event), rx))
            })
            .boxed(),
        }
    }
}

/// Mock broker connector
pub struct MockConnector {
    source: Mutex<Option<EventSource>>,
    should_fail: bool,
    handle: Arc<MockHandle>,
    connect_calls: AtomicUsize,
}

impl MockConnector {
    /// Deliver `events`, then close the stream
    pub fn new(events: Vec<InboundEvent>) -> Self {
        Self::from_source(EventSource::Scripted {
            events,
            keep_open: false,
        })
    }

    /// Deliver `events`, then block forever like an idle subscription
    pub fn keep_open(events: Vec<InboundEvent>) -> Self {
        Self::from_source(EventSource::Scripted {
            events,
            keep_open: true,
        })
    }

    /// Stream fed by the returned sender; closes when the sender is dropped
    pub fn live() -> (Self, mpsc::UnboundedSender<InboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::from_source(EventSource::Live(rx)), tx)
    }

    /// Every connect attempt fails
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Self::new(Vec::new())
        }
    }

    fn from_source(source: EventSource) -> Self {
        Self {
            source: Mutex::new(Some(source)),
            should_fail: false,
            handle: Arc::new(MockHandle::new()),
            connect_calls: AtomicUsize::new(0),
        }
    }

    /// Probe handle given out on successful connect
    pub fn handle(&self) -> Arc<MockHandle> {
        self.handle.clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerConnector for MockConnector {
    async fn connect(&self, channel: &str) -> Result<BrokerSession, BrokerError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(BrokerError::ConnectionFailed(format!(
                "Mock connection failure for channel {channel}"
            )));
        }

        let events = match self.source.lock().await.take() {
            Some(source) => source.into_stream(),
            None => stream::empty().boxed(),
        };

        Ok(BrokerSession {
            handle: self.handle.clone(),
            events,
        })
    }

    fn address(&self) -> String {
        "mock://broker".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::EventKind;

    #[tokio::test]
    async fn test_scripted_connector_yields_events_then_ends() {
        let connector = MockConnector::new(vec![
            InboundEvent::control(EventKind::Subscribe, "logs"),
            InboundEvent::message("logs", b"1".to_vec()),
        ]);

        let session = connector.connect("logs").await.unwrap();
        let events: Vec<_> = session.events.collect().await;

        assert_eq!(events.len(), 2);
        assert_eq!(connector.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_live_connector_forwards_sent_events() {
        let (connector, tx) = MockConnector::live();
        let mut session = connector.connect("logs").await.unwrap();

        tx.send(InboundEvent::message("logs", b"7".to_vec())).unwrap();
        drop(tx);

        let first = session.events.next().await.unwrap().unwrap();
        assert_eq!(first.payload, b"7");
        assert!(session.events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_handle_toggles() {
        let handle = MockHandle::new();
        assert!(handle.ping().await.is_ok());
        handle.set_alive(false);
        assert!(handle.ping().await.is_err());
        assert_eq!(handle.ping_count(), 2);
    }
}
