/*
   This module specifies the collaborators the delivery pipeline depends on.
   Each one is injected by the hosting process.
*/

use crate::domain::subscription::{Subscription, SubscriptionUpdate};
use crate::error::WebhookError;
use async_trait::async_trait;

/// Largest number of messages a queue accepts in one `send_batch` call.
pub const MAX_BATCH_SIZE: usize = 10;

/// Tenant-scoped store of subscriptions
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    async fn get(
        &self,
        tenant_id: &str,
        webhook_id: &str,
    ) -> Result<Option<Subscription>, WebhookError>;

    /// Secondary lookup that ignores the tenant
    async fn find_by_webhook_id(&self, webhook_id: &str)
    -> Result<Option<Subscription>, WebhookError>;

    async fn list(&self, tenant_id: &str) -> Result<Vec<Subscription>, WebhookError>;

    /// Enabled subscriptions of the tenant whose event types contain `event_type`
    async fn find_enabled_for_event(
        &self,
        tenant_id: &str,
        event_type: &str,
    ) -> Result<Vec<Subscription>, WebhookError>;

    async fn create(&self, subscription: Subscription) -> Result<Subscription, WebhookError>;

    async fn update(
        &self,
        tenant_id: &str,
        webhook_id: &str,
        update: SubscriptionUpdate,
        updated_by: &str,
    ) -> Result<Subscription, WebhookError>;

    /// Atomically replace the stored secret ciphertext
    async fn replace_secret(
        &self,
        tenant_id: &str,
        webhook_id: &str,
        encrypted_secret: String,
        updated_by: &str,
    ) -> Result<Subscription, WebhookError>;

    async fn delete(&self, tenant_id: &str, webhook_id: &str) -> Result<(), WebhookError>;
}

/// Error type for key-management operations
#[derive(Debug, thiserror::Error)]
pub enum KmsError {
    #[error("Key management service unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed")]
    DecryptionFailed,
}

/// Envelope encryption under a managed key
#[async_trait]
pub trait KeyManagement: Send + Sync {
    /// Encrypt `plaintext` under `key_id`, returning an opaque transport-safe blob
    async fn encrypt(&self, plaintext: &[u8], key_id: &str) -> Result<String, KmsError>;

    /// Decrypt a blob produced by [`KeyManagement::encrypt`]
    async fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, KmsError>;
}

/// Error type for queue operations
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue '{0}' does not exist")]
    UnknownQueue(String),

    #[error("Batch of {0} messages exceeds the limit of {max}", max = MAX_BATCH_SIZE)]
    BatchTooLarge(usize),

    #[error("Message {0} is not in flight")]
    NotInFlight(String),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

/// One message to enqueue; `id` is only meaningful within its batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: String,
    pub body: String,
}

/// Per-entry outcome of a batch send
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendBatchResult {
    pub successful: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// A message handed to a consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Stable across redeliveries
    pub message_id: String,
    pub body: String,
    /// 1 on first delivery
    pub receive_count: u32,
}

/// At-least-once queue with per-message acknowledgement
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    /// Enqueue up to [`MAX_BATCH_SIZE`] messages; entries succeed or fail independently
    async fn send_batch(
        &self,
        queue: &str,
        entries: Vec<QueueEntry>,
    ) -> Result<SendBatchResult, QueueError>;

    /// Take up to `max_messages` visible messages, hiding them for the visibility timeout
    async fn receive(&self, max_messages: usize) -> Result<Vec<QueueMessage>, QueueError>;

    /// Remove a processed message
    async fn ack(&self, message_id: &str) -> Result<(), QueueError>;

    /// Report a failed message for redelivery; the queue decides backoff and dead-lettering
    async fn fail(&self, message_id: &str) -> Result<(), QueueError>;
}
