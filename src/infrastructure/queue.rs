//! In-memory at-least-once queue with visibility timeouts.
//!
//! A received message stays hidden until it is acknowledged, failed, or its
//! visibility timeout lapses. Failed messages come back after the retry
//! strategy's backoff; once the attempt budget is spent they move to the
//! dead-letter list.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::ports::{
    DeliveryQueue, MAX_BATCH_SIZE, QueueEntry, QueueError, QueueMessage, SendBatchResult,
};
use crate::outbound::webhook::retry_strategy::RetryStrategy;

/// Default time a received message stays hidden from other consumers
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    receive_count: u32,
    visible_at: Instant,
    in_flight: bool,
}

/// A message that exhausted its attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadLetter {
    pub message_id: String,
    pub body: String,
    pub receive_count: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub dead_lettered_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<StoredMessage>,
    dead_letters: Vec<DeadLetter>,
}

#[derive(Debug, Clone)]
pub struct InMemoryDeliveryQueue {
    name: String,
    retry: RetryStrategy,
    visibility_timeout: Duration,
    state: Arc<Mutex<QueueState>>,
}

impl InMemoryDeliveryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            retry: RetryStrategy::default_strategy(),
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            state: Arc::new(Mutex::new(QueueState::default())),
        }
    }

    pub fn with_retry_strategy(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_visibility_timeout(mut self, visibility_timeout: Duration) -> Self {
        self.visibility_timeout = visibility_timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Messages not yet acknowledged or dead-lettered, in flight or not
    pub async fn len(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.messages.is_empty()
    }

    /// Messages a `receive` would hand out right now
    pub async fn visible_len(&self) -> usize {
        let now = Instant::now();
        let state = self.state.lock().await;
        state
            .messages
            .iter()
            .filter(|m| m.visible_at <= now)
            .count()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead_letters.clone()
    }

    fn dead_letter(state: &mut QueueState, message: StoredMessage) {
        warn!(
            message_id = %message.message_id,
            receive_count = message.receive_count,
            "Message exhausted its attempts, moving to dead-letter list"
        );
        state.dead_letters.push(DeadLetter {
            message_id: message.message_id,
            body: message.body,
            receive_count: message.receive_count,
            dead_lettered_at: OffsetDateTime::now_utc(),
        });
    }
}

#[async_trait]
impl DeliveryQueue for InMemoryDeliveryQueue {
    async fn send_batch(
        &self,
        queue: &str,
        entries: Vec<QueueEntry>,
    ) -> Result<SendBatchResult, QueueError> {
        if queue != self.name {
            return Err(QueueError::UnknownQueue(queue.to_string()));
        }
        if entries.len() > MAX_BATCH_SIZE {
            return Err(QueueError::BatchTooLarge(entries.len()));
        }

        let now = Instant::now();
        let mut result = SendBatchResult::default();
        let mut seen = HashSet::new();
        let mut state = self.state.lock().await;

        for entry in entries {
            if !seen.insert(entry.id.clone()) {
                result
                    .failed
                    .push((entry.id, "duplicate entry id in batch".to_string()));
                continue;
            }
            if entry.body.is_empty() {
                result
                    .failed
                    .push((entry.id, "message body is empty".to_string()));
                continue;
            }

            state.messages.push_back(StoredMessage {
                message_id: Uuid::new_v4().to_string(),
                body: entry.body,
                receive_count: 0,
                visible_at: now,
                in_flight: false,
            });
            result.successful.push(entry.id);
        }

        debug!(
            queue = %self.name,
            sent = result.successful.len(),
            failed = result.failed.len(),
            "Batch enqueued"
        );
        Ok(result)
    }

    async fn receive(&self, max_messages: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let now = Instant::now();
        let max_attempts = self.retry.max_attempts();
        let mut state = self.state.lock().await;
        let mut received = Vec::new();
        let mut index = 0;

        while index < state.messages.len() && received.len() < max_messages {
            let message = &mut state.messages[index];
            if message.visible_at > now {
                index += 1;
                continue;
            }

            // A consumer that never settled the message still spent an attempt
            if message.receive_count >= max_attempts {
                if let Some(expired) = state.messages.remove(index) {
                    Self::dead_letter(&mut state, expired);
                }
                continue;
            }

            message.receive_count += 1;
            message.visible_at = now + self.visibility_timeout;
            message.in_flight = true;
            received.push(QueueMessage {
                message_id: message.message_id.clone(),
                body: message.body.clone(),
                receive_count: message.receive_count,
            });
            index += 1;
        }

        Ok(received)
    }

    async fn ack(&self, message_id: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let position = state
            .messages
            .iter()
            .position(|m| m.message_id == message_id && m.in_flight)
            .ok_or_else(|| QueueError::NotInFlight(message_id.to_string()))?;

        state.messages.remove(position);
        debug!(message_id = %message_id, "Message acknowledged");
        Ok(())
    }

    async fn fail(&self, message_id: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let position = state
            .messages
            .iter()
            .position(|m| m.message_id == message_id && m.in_flight)
            .ok_or_else(|| QueueError::NotInFlight(message_id.to_string()))?;

        let receive_count = state.messages[position].receive_count;
        match self.retry.next_delay(receive_count) {
            Some(delay) => {
                let message = &mut state.messages[position];
                message.visible_at = Instant::now() + delay;
                message.in_flight = false;
                info!(
                    message_id = %message_id,
                    attempt = receive_count,
                    delay_secs = delay.as_secs(),
                    "Message scheduled for redelivery"
                );
            }
            None => {
                if let Some(message) = state.messages.remove(position) {
                    Self::dead_letter(&mut state, message);
                }
            }
        }
        Ok(())
    }
}
