//! Message processor with simulated downstream latency
//!
//! Each decoded message waits for a random delay drawn uniformly from
//! `[0, max_delay)` and is then written to the log as a single line.

use crate::config::ProcessingSection;
use rand::Rng;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Errors raised while turning a message into its log record
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Failed to format message: {0}")]
    Format(#[from] serde_json::Error),
}

/// What happened to a single message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The message was logged after `delay_ms`
    Logged { delay_ms: u64, line: String },
    /// Formatting failed; the error was logged instead
    Failed { reason: String },
}

impl ProcessOutcome {
    pub fn is_logged(&self) -> bool {
        matches!(self, ProcessOutcome::Logged { .. })
    }
}

/// Sleeps a bounded random delay per message, then logs it
#[derive(Debug, Clone)]
pub struct MessageProcessor {
    max_delay: Duration,
}

impl MessageProcessor {
    pub fn new(max_delay: Duration) -> Self {
        Self { max_delay }
    }

    pub fn from_section(section: &ProcessingSection) -> Self {
        Self::new(Duration::from_millis(section.max_delay_ms))
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Draw a delay uniformly from `[0, max_delay)` at millisecond resolution
    pub fn draw_delay(&self) -> Duration {
        let max_ms = self.max_delay.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }

    /// Process one message. Never returns an error to the caller.
    pub async fn process(&self, message: Value) -> ProcessOutcome {
        let delay = self.draw_delay();
        tokio::time::sleep(delay).await;

        let delay_ms = delay.as_millis() as u64;
        match format_record(delay_ms, &message) {
            Ok(line) => {
                info!(delay_ms, "{}", line);
                ProcessOutcome::Logged { delay_ms, line }
            }
            Err(e) => {
                error!("Error processing message: {}", e);
                ProcessOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

impl Default for MessageProcessor {
    fn default() -> Self {
        Self::from_section(&ProcessingSection::default())
    }
}

/// Render the log record for a processed message
pub fn format_record(delay_ms: u64, message: &Value) -> Result<String, ProcessingError> {
    let rendered = serde_json::to_string(message)?;
    Ok(format!(
        "message received after waiting for {delay_ms}ms: {rendered}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Instant;

    #[test]
    fn test_format_record() {
        let line = format_record(42, &json!({"id": 1})).unwrap();
        assert_eq!(line, r#"message received after waiting for 42ms: {"id":1}"#);
    }

    #[test]
    fn test_format_record_scalar_values() {
        assert!(format_record(0, &json!("hello")).unwrap().ends_with(r#": "hello""#));
        assert!(format_record(0, &json!(null)).unwrap().ends_with(": null"));
        assert!(format_record(0, &json!([1, 2])).unwrap().ends_with(": [1,2]"));
    }

    #[test]
    fn test_default_max_delay() {
        assert_eq!(
            MessageProcessor::default().max_delay(),
            Duration::from_millis(2000)
        );
    }

    #[test]
    fn test_zero_max_delay_never_sleeps() {
        let processor = MessageProcessor::new(Duration::ZERO);
        for _ in 0..100 {
            assert_eq!(processor.draw_delay(), Duration::ZERO);
        }
    }

    #[tokio::test]
    async fn test_process_logs_message_with_delay() {
        let processor = MessageProcessor::new(Duration::from_millis(20));
        let start = Instant::now();

        let outcome = processor.process(json!({"id": 1})).await;

        match outcome {
            ProcessOutcome::Logged { delay_ms, line } => {
                assert!(delay_ms < 20);
                assert!(line.contains(r#"{"id":1}"#));
                assert!(line.contains(&format!("{delay_ms}ms")));
                assert!(start.elapsed() >= Duration::from_millis(delay_ms));
            }
            other => panic!("expected logged outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_process_default_bound_terminates_within_two_seconds() {
        let processor = MessageProcessor::default();
        let outcome = tokio::time::timeout(
            Duration::from_millis(2500),
            processor.process(json!({"id": 2})),
        )
        .await
        .expect("processing must finish within the delay bound");
        assert!(outcome.is_logged());
    }

    proptest! {
        #[test]
        fn test_delay_stays_below_bound(max_ms in 1u64..5000) {
            let processor = MessageProcessor::new(Duration::from_millis(max_ms));
            for _ in 0..32 {
                prop_assert!(processor.draw_delay() < Duration::from_millis(max_ms));
            }
        }
    }
}
