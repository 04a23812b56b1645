//! Outbound notification seam.
//!
//! The engine pushes text to numeric chat destinations through
//! [`NotificationSink`]. Delivery is best effort: callers log failures and
//! keep whatever state change triggered the message.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::NotificationError;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver `text` to `destination`.
    async fn send(&self, destination: i64, text: &str) -> Result<(), NotificationError>;
}

/// A message captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub destination: i64,
    pub text: String,
}

/// Sink that keeps every message in memory. Can be told to fail deliveries
/// whose text contains a marker.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<SentMessage>>,
    fail_when_contains: Mutex<Option<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any delivery whose text contains `marker`.
    pub fn fail_when_contains(&self, marker: impl Into<String>) {
        *lock(&self.fail_when_contains) = Some(marker.into());
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    pub fn sent_to(&self, destination: i64) -> Vec<String> {
        lock(&self.sent)
            .iter()
            .filter(|m| m.destination == destination)
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.sent).clear();
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, destination: i64, text: &str) -> Result<(), NotificationError> {
        if let Some(marker) = lock(&self.fail_when_contains).as_deref() {
            if text.contains(marker) {
                return Err(NotificationError::DeliveryFailed {
                    destination,
                    message: "simulated failure".into(),
                });
            }
        }
        lock(&self.sent).push(SentMessage {
            destination,
            text: text.to_string(),
        });
        Ok(())
    }
}

/// Sink that only logs. Used when no transport is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, destination: i64, text: &str) -> Result<(), NotificationError> {
        tracing::info!(destination, text, "notification (log only)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_sink_captures_and_fails_on_marker() {
        let sink = RecordingSink::new();
        sink.send(1, "hello").await.unwrap();
        sink.fail_when_contains("boom");
        assert!(sink.send(2, "boom here").await.is_err());
        sink.send(2, "fine").await.unwrap();
        assert_eq!(sink.sent_to(1), vec!["hello".to_string()]);
        assert_eq!(sink.sent_to(2), vec!["fine".to_string()]);
    }
}
