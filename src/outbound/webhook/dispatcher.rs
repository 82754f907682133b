use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::schemas::new_message_id;
use crate::domain::job::DeliveryJob;
use crate::domain::ports::{DeliveryQueue, MAX_BATCH_SIZE, QueueEntry, QueueError, SubscriptionRegistry};
use crate::error::WebhookError;

/// Outcome of fanning one event out to its subscriptions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    pub enqueued: usize,

    /// Subscriptions whose job reached the queue
    pub webhook_ids: Vec<String>,

    /// Subscriptions whose job the queue refused
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_webhook_ids: Vec<String>,
}

/// Turns a tenant event into one queued [`DeliveryJob`] per matching subscription.
pub struct Dispatcher {
    registry: Arc<dyn SubscriptionRegistry>,
    queue: Arc<dyn DeliveryQueue>,
    queue_name: String,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn SubscriptionRegistry>,
        queue: Arc<dyn DeliveryQueue>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            queue,
            queue_name: queue_name.into(),
        }
    }

    /// Enqueue `payload` for every enabled subscription of the tenant listening to `event_type`.
    ///
    /// Zero matches is not an error. Items the queue rejects are reported in
    /// [`DispatchResult::failed_webhook_ids`] without failing their batch siblings.
    pub async fn dispatch(
        &self,
        tenant_id: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<DispatchResult, WebhookError> {
        if self.queue_name.trim().is_empty() {
            return Err(WebhookError::Configuration(
                "queue.name is not set".to_string(),
            ));
        }
        if tenant_id.trim().is_empty() || event_type.trim().is_empty() {
            return Err(WebhookError::Validation(
                "tenant_id and event_type are required".to_string(),
            ));
        }

        let subscriptions = self
            .registry
            .find_enabled_for_event(tenant_id, event_type)
            .await?;

        if subscriptions.is_empty() {
            debug!(
                tenant_id = %tenant_id,
                event_type = %event_type,
                "No subscriptions matched, nothing to enqueue"
            );
            return Ok(DispatchResult::default());
        }

        let mut entries = Vec::with_capacity(subscriptions.len());
        for subscription in &subscriptions {
            let job = DeliveryJob::new(
                tenant_id,
                subscription.webhook_id.as_str(),
                event_type,
                payload.clone(),
            )
            .with_message_id(new_message_id());

            // Webhook ids are unique within a tenant, so they double as batch entry ids
            entries.push(QueueEntry {
                id: subscription.webhook_id.clone(),
                body: job.to_body()?,
            });
        }

        let mut result = DispatchResult::default();
        for chunk in entries.chunks(MAX_BATCH_SIZE) {
            self.send_chunk(chunk, &mut result).await?;
        }
        result.enqueued = result.webhook_ids.len();

        info!(
            tenant_id = %tenant_id,
            event_type = %event_type,
            matched = subscriptions.len(),
            enqueued = result.enqueued,
            failed = result.failed_webhook_ids.len(),
            "Event dispatched"
        );

        Ok(result)
    }

    async fn send_chunk(
        &self,
        chunk: &[QueueEntry],
        result: &mut DispatchResult,
    ) -> Result<(), WebhookError> {
        match self.queue.send_batch(&self.queue_name, chunk.to_vec()).await {
            Ok(sent) => {
                for (webhook_id, reason) in &sent.failed {
                    warn!(webhook_id = %webhook_id, reason = %reason, "Queue rejected delivery job");
                }
                result.webhook_ids.extend(sent.successful);
                result
                    .failed_webhook_ids
                    .extend(sent.failed.into_iter().map(|(id, _)| id));
                Ok(())
            }
            Err(err @ QueueError::UnknownQueue(_)) => Err(err.into()),
            Err(err) => {
                error!(
                    queue = %self.queue_name,
                    batch_size = chunk.len(),
                    error = %err,
                    "Batch enqueue failed"
                );
                result
                    .failed_webhook_ids
                    .extend(chunk.iter().map(|entry| entry.id.clone()));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{QueueMessage, SendBatchResult};
    use crate::domain::subscription::{
        NewSubscription, Subscription, SubscriptionStatus, SubscriptionUpdate,
    };
    use crate::infrastructure::queue::InMemoryDeliveryQueue;
    use crate::infrastructure::registry::InMemorySubscriptionRegistry;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;

    const QUEUE: &str = "webhook-deliveries";

    /// Delegates to an in-memory queue while recording batch sizes
    struct RecordingQueue {
        inner: InMemoryDeliveryQueue,
        batches: Mutex<Vec<usize>>,
        reject: Option<String>,
        unavailable: bool,
    }

    impl RecordingQueue {
        fn new() -> Self {
            Self {
                inner: InMemoryDeliveryQueue::new(QUEUE),
                batches: Mutex::new(Vec::new()),
                reject: None,
                unavailable: false,
            }
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeliveryQueue for RecordingQueue {
        async fn send_batch(
            &self,
            queue: &str,
            entries: Vec<QueueEntry>,
        ) -> Result<SendBatchResult, QueueError> {
            self.batches.lock().unwrap().push(entries.len());
            if self.unavailable {
                return Err(QueueError::Unavailable("throttled".to_string()));
            }

            let (rejected, accepted): (Vec<_>, Vec<_>) = entries
                .into_iter()
                .partition(|e| self.reject.as_deref() == Some(e.id.as_str()));
            let mut result = self.inner.send_batch(queue, accepted).await?;
            result
                .failed
                .extend(rejected.into_iter().map(|e| (e.id, "rejected".to_string())));
            Ok(result)
        }

        async fn receive(&self, max_messages: usize) -> Result<Vec<QueueMessage>, QueueError> {
            self.inner.receive(max_messages).await
        }

        async fn ack(&self, message_id: &str) -> Result<(), QueueError> {
            self.inner.ack(message_id).await
        }

        async fn fail(&self, message_id: &str) -> Result<(), QueueError> {
            self.inner.fail(message_id).await
        }
    }

    struct UnavailableRegistry;

    fn down<T>() -> Result<T, WebhookError> {
        Err(WebhookError::Store("registry unreachable".to_string()))
    }

    #[async_trait]
    impl SubscriptionRegistry for UnavailableRegistry {
        async fn get(&self, _: &str, _: &str) -> Result<Option<Subscription>, WebhookError> {
            down()
        }
        async fn find_by_webhook_id(&self, _: &str) -> Result<Option<Subscription>, WebhookError> {
            down()
        }
        async fn list(&self, _: &str) -> Result<Vec<Subscription>, WebhookError> {
            down()
        }
        async fn find_enabled_for_event(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Vec<Subscription>, WebhookError> {
            down()
        }
        async fn create(&self, _: Subscription) -> Result<Subscription, WebhookError> {
            down()
        }
        async fn update(
            &self,
            _: &str,
            _: &str,
            _: SubscriptionUpdate,
            _: &str,
        ) -> Result<Subscription, WebhookError> {
            down()
        }
        async fn replace_secret(
            &self,
            _: &str,
            _: &str,
            _: String,
            _: &str,
        ) -> Result<Subscription, WebhookError> {
            down()
        }
        async fn delete(&self, _: &str, _: &str) -> Result<(), WebhookError> {
            down()
        }
    }

    /// `(tenant, webhook, comma-separated event types)`
    async fn registry_with(subscriptions: &[(&str, &str, &str)]) -> Arc<InMemorySubscriptionRegistry> {
        let registry = InMemorySubscriptionRegistry::new();
        for (tenant, webhook, types) in subscriptions {
            registry
                .create(Subscription::new(
                    tenant.to_string(),
                    webhook.to_string(),
                    NewSubscription::new(
                        "https://example.com/hook",
                        types.split(',').map(str::to_string).collect(),
                    ),
                    "ciphertext".to_string(),
                ))
                .await
                .unwrap();
        }
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_one_job_per_matching_subscription() -> Result<(), WebhookError> {
        let registry = registry_with(&[
            ("t1", "wh-1", "user.created"),
            ("t1", "wh-2", "user.created,user.deleted"),
            ("t1", "wh-3", "user.deleted"),
            ("t1", "wh-4", "user.created"),
            ("t2", "wh-5", "user.created"),
        ])
        .await;
        registry
            .update(
                "t1",
                "wh-4",
                SubscriptionUpdate::status(SubscriptionStatus::Disabled),
                "admin",
            )
            .await?;

        let queue = Arc::new(InMemoryDeliveryQueue::new(QUEUE));
        let dispatcher = Dispatcher::new(registry, queue.clone(), QUEUE);

        let result = dispatcher
            .dispatch("t1", "user.created", json!({"id": "u1"}))
            .await?;
        assert_eq!(result.enqueued, 2);
        assert_eq!(result.webhook_ids, vec!["wh-1", "wh-2"]);
        assert!(result.failed_webhook_ids.is_empty());

        let messages = queue.receive(10).await.unwrap();
        assert_eq!(messages.len(), 2);

        let mut message_ids = HashSet::new();
        for message in messages {
            let job = DeliveryJob::parse(&message.body)?;
            assert_eq!(job.tenant_id, "t1");
            assert_eq!(job.event_type, "user.created");
            assert_eq!(job.payload, json!({"id": "u1"}));
            let message_id = job.message_id.expect("dispatcher mints a message id");
            assert!(message_id.starts_with("msg_"));
            message_ids.insert(message_id);
        }
        assert_eq!(message_ids.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_matches_is_success() -> Result<(), WebhookError> {
        let registry = registry_with(&[("t1", "wh-1", "user.deleted")]).await;
        let queue = Arc::new(RecordingQueue::new());
        let dispatcher = Dispatcher::new(registry, queue.clone(), QUEUE);

        let result = dispatcher.dispatch("t1", "user.created", json!({})).await?;
        assert_eq!(result, DispatchResult::default());
        assert!(queue.batch_sizes().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_batches_are_bounded() -> Result<(), WebhookError> {
        let ids: Vec<String> = (0..25).map(|i| format!("wh-{i:02}")).collect();
        let specs: Vec<(&str, &str, &str)> = ids.iter().map(|id| ("t1", id.as_str(), "a.b")).collect();
        let registry = registry_with(&specs).await;
        let queue = Arc::new(RecordingQueue::new());
        let dispatcher = Dispatcher::new(registry, queue.clone(), QUEUE);

        let result = dispatcher.dispatch("t1", "a.b", json!(null)).await?;
        assert_eq!(result.enqueued, 25);
        assert_eq!(queue.batch_sizes(), vec![10, 10, 5]);
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_batch_failure_is_reported_per_item() -> Result<(), WebhookError> {
        let registry = registry_with(&[
            ("t1", "wh-1", "a.b"),
            ("t1", "wh-2", "a.b"),
            ("t1", "wh-3", "a.b"),
        ])
        .await;
        let mut queue = RecordingQueue::new();
        queue.reject = Some("wh-2".to_string());
        let dispatcher = Dispatcher::new(registry, Arc::new(queue), QUEUE);

        let result = dispatcher.dispatch("t1", "a.b", json!({})).await?;
        assert_eq!(result.enqueued, 2);
        assert_eq!(result.webhook_ids, vec!["wh-1", "wh-3"]);
        assert_eq!(result.failed_webhook_ids, vec!["wh-2"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unavailable_queue_marks_whole_chunk_failed() -> Result<(), WebhookError> {
        let registry = registry_with(&[("t1", "wh-1", "a.b"), ("t1", "wh-2", "a.b")]).await;
        let mut queue = RecordingQueue::new();
        queue.unavailable = true;
        let dispatcher = Dispatcher::new(registry, Arc::new(queue), QUEUE);

        let result = dispatcher.dispatch("t1", "a.b", json!({})).await?;
        assert_eq!(result.enqueued, 0);
        assert_eq!(result.failed_webhook_ids, vec!["wh-1", "wh-2"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_queue_name_is_configuration_error() {
        let queue = Arc::new(RecordingQueue::new());
        let dispatcher = Dispatcher::new(Arc::new(UnavailableRegistry), queue.clone(), "");

        let result = dispatcher.dispatch("t1", "a.b", json!({})).await;
        assert!(matches!(result, Err(WebhookError::Configuration(_))));
        assert!(queue.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_queue_is_configuration_error() {
        let registry = registry_with(&[("t1", "wh-1", "a.b")]).await;
        let queue = Arc::new(InMemoryDeliveryQueue::new(QUEUE));
        let dispatcher = Dispatcher::new(registry, queue.clone(), "other-queue");

        let result = dispatcher.dispatch("t1", "a.b", json!({})).await;
        assert!(matches!(result, Err(WebhookError::Configuration(_))));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_registry_failure_enqueues_nothing() {
        let queue = Arc::new(RecordingQueue::new());
        let dispatcher = Dispatcher::new(Arc::new(UnavailableRegistry), queue.clone(), QUEUE);

        let result = dispatcher.dispatch("t1", "a.b", json!({})).await;
        assert!(matches!(result, Err(WebhookError::Store(_))));
        assert!(queue.batch_sizes().is_empty());
    }
}
