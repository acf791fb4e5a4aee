//! Worker lifecycle: connect once, consume the channel, then park
//!
//! The worker never reconnects. After a failed connect or a closed stream it
//! parks until shutdown so the health server can keep reporting the state to
//! whatever supervises the process.

use crate::broker::{BrokerConnector, BrokerError, ConnectionManager, HealthState};
use crate::processor::{MessageProcessor, ProcessOutcome};
use crate::subscription::{LoopExit, LoopReport, SubscriptionLoop};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// How the consuming phase of the worker ended
#[derive(Debug)]
pub enum WorkerOutcome {
    /// The initial connection failed; the loop never started
    ConnectFailed(BrokerError),
    /// The subscription stream ended or failed
    StreamClosed(LoopReport),
}

/// Pub/sub worker with an injected broker connector
pub struct Worker<C: BrokerConnector> {
    channel: String,
    manager: ConnectionManager<C>,
    subscription: SubscriptionLoop,
}

impl<C: BrokerConnector> Worker<C> {
    pub fn new(
        connector: C,
        channel: impl Into<String>,
        state: HealthState,
        processor: MessageProcessor,
    ) -> Self {
        Self {
            channel: channel.into(),
            manager: ConnectionManager::new(connector, state),
            subscription: SubscriptionLoop::new(processor),
        }
    }

    /// Forward every processing outcome to `sender`
    pub fn with_outcome_sender(mut self, sender: mpsc::UnboundedSender<ProcessOutcome>) -> Self {
        self.subscription = self.subscription.with_outcome_sender(sender);
        self
    }

    pub fn state(&self) -> &HealthState {
        self.manager.state()
    }

    /// Connect and consume until the stream is gone
    pub async fn consume(&self) -> WorkerOutcome {
        let session = match self.manager.connect(&self.channel).await {
            Ok(session) => session,
            Err(e) => return WorkerOutcome::ConnectFailed(e),
        };

        info!("Listening for messages on channel {}", self.channel);
        let report = self.subscription.run(session.events).await;
        WorkerOutcome::StreamClosed(report)
    }

    /// Consume, then park until `shutdown` flips to true or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tokio::select! {
            outcome = self.consume() => {
                match outcome {
                    WorkerOutcome::ConnectFailed(e) => {
                        error!("Worker idle: broker connection failed ({})", e);
                    }
                    WorkerOutcome::StreamClosed(LoopReport { stats, exit }) => {
                        let reason = match exit {
                            LoopExit::StreamEnded => "stream ended".to_string(),
                            LoopExit::StreamError(e) => e,
                        };
                        warn!(
                            "Worker idle: subscription closed ({}) after {} messages",
                            reason, stats.processed
                        );
                    }
                }
            }
            _ = wait_for_shutdown(&mut shutdown) => {
                info!("Worker stopping");
                return;
            }
        }

        wait_for_shutdown(&mut shutdown).await;
        info!("Worker stopping");
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
