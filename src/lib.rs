//! Log Message Processor
//!
//! A Redis pub/sub worker that logs every message after a simulated,
//! variable processing delay, with an HTTP health endpoint reporting whether
//! the broker connection is usable.
//!
//! # Overview
//!
//! - [`broker`] - broker traits, the Redis backend, the connection manager
//!   and the write-once health state
//! - [`processor`] - per-message delay and log record
//! - [`subscription`] - sequential consumption of the subscription stream
//! - [`worker`] - connect once, consume, then park
//! - [`observability`] - structured logging and the health server
//!
//! # Quick Start
//!
//! ```rust
//! use log_message_processor::broker::{EventKind, InboundEvent};
//! use log_message_processor::processor::MessageProcessor;
//! use log_message_processor::subscription::SubscriptionLoop;
//! use futures::StreamExt;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let events = futures::stream::iter(vec![
//!     Ok(InboundEvent::control(EventKind::Subscribe, "log_channel")),
//!     Ok(InboundEvent::message("log_channel", br#"{"id":1}"#.to_vec())),
//! ])
//! .boxed();
//!
//! let subscription = SubscriptionLoop::new(MessageProcessor::new(Duration::from_millis(10)));
//! let report = subscription.run(events).await;
//! assert_eq!(report.stats.processed, 1);
//! assert_eq!(report.stats.skipped, 1);
//! # });
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod observability;
pub mod processor;
pub mod subscription;
pub mod testing;
pub mod worker;

pub use broker::{BrokerConnector, BrokerHandle, HealthState, RedisConnector};
pub use config::*;
pub use error::{WorkerError, WorkerResult};
pub use observability::HealthServer;
pub use processor::{MessageProcessor, ProcessOutcome};
pub use subscription::{LoopReport, LoopStats, SubscriptionLoop};
pub use worker::{Worker, WorkerOutcome};
