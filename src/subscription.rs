//! Subscription loop: pulls inbound events and feeds data messages to the processor
//!
//! The loop alternates between awaiting the next event and processing a data
//! message inline, so processing is strictly sequential and in stream order.
//! A bad message is logged and skipped; only the end of the stream (or a
//! stream error) stops the loop.

use crate::broker::{EventKind, EventStream, InboundEvent};
use crate::message_span;
use crate::processor::{MessageProcessor, ProcessOutcome};
use futures::StreamExt;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, warn, Instrument};

/// Errors decoding a data payload
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Decode a UTF-8 JSON payload
pub fn decode_payload(payload: &[u8]) -> Result<Value, DecodeError> {
    let text = std::str::from_utf8(payload)?;
    Ok(serde_json::from_str(text)?)
}

/// Routing decision for one inbound event
#[derive(Debug, PartialEq, Eq)]
pub enum EventRoute<'a> {
    /// Data message to decode and process
    Data(&'a [u8]),
    /// Control notification to discard
    Control(&'a EventKind),
}

/// Only plain channel messages carry data for this worker
pub fn route_event(event: &InboundEvent) -> EventRoute<'_> {
    match event.kind {
        EventKind::Message => EventRoute::Data(&event.payload),
        _ => EventRoute::Control(&event.kind),
    }
}

/// Counters accumulated over one run of the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub received: u64,
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// The broker closed the subscription stream
    StreamEnded,
    /// The stream yielded an error. Never produced over Redis, where a
    /// closed subscription is always [`LoopExit::StreamEnded`].
    StreamError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopReport {
    pub stats: LoopStats,
    pub exit: LoopExit,
}

/// Sequential consumer of a subscription stream
pub struct SubscriptionLoop {
    processor: MessageProcessor,
    outcome_sender: Option<mpsc::UnboundedSender<ProcessOutcome>>,
}

impl SubscriptionLoop {
    pub fn new(processor: MessageProcessor) -> Self {
        Self {
            processor,
            outcome_sender: None,
        }
    }

    /// Observe every data message outcome, in processing order.
    /// Decode failures are reported as [`ProcessOutcome::Failed`].
    pub fn with_outcome_sender(mut self, sender: mpsc::UnboundedSender<ProcessOutcome>) -> Self {
        self.outcome_sender = Some(sender);
        self
    }

    /// Consume `events` until the stream ends or fails
    pub async fn run(&self, mut events: EventStream) -> LoopReport {
        let mut stats = LoopStats::default();

        let exit = loop {
            let event = match events.next().await {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    error!("Subscription stream failed: {}", e);
                    break LoopExit::StreamError(e.to_string());
                }
                None => {
                    warn!("Subscription stream closed by broker");
                    break LoopExit::StreamEnded;
                }
            };
            stats.received += 1;

            let payload = match route_event(&event) {
                EventRoute::Data(payload) => payload,
                EventRoute::Control(kind) => {
                    debug!("Skipping {} event on channel {}", kind, event.channel);
                    stats.skipped += 1;
                    continue;
                }
            };

            let span = message_span!(channel = %event.channel, seq = stats.received);
            let outcome = self.handle_payload(payload).instrument(span).await;

            if outcome.is_logged() {
                stats.processed += 1;
            } else {
                stats.failed += 1;
            }
            self.report(outcome);
        };

        debug!(
            "Subscription loop finished: received={}, processed={}, skipped={}, failed={}",
            stats.received, stats.processed, stats.skipped, stats.failed
        );
        LoopReport { stats, exit }
    }

    async fn handle_payload(&self, payload: &[u8]) -> ProcessOutcome {
        match decode_payload(payload) {
            Ok(message) => self.processor.process(message).await,
            Err(e) => {
                error!("Error processing message: {}", e);
                ProcessOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn report(&self, outcome: ProcessOutcome) {
        if let Some(ref sender) = self.outcome_sender {
            // A dropped receiver only means nobody is observing anymore.
            let _ = sender.send(outcome);
        }
    }
}
