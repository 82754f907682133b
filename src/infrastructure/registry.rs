use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::ports::SubscriptionRegistry;
use crate::domain::subscription::{Subscription, SubscriptionUpdate};
use crate::error::WebhookError;

type Key = (String, String);

fn key(tenant_id: &str, webhook_id: &str) -> Key {
    (tenant_id.to_string(), webhook_id.to_string())
}

/// Process-local subscription store keyed by (tenant, webhook)
#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptionRegistry {
    subscriptions: Arc<RwLock<HashMap<Key, Subscription>>>,
}

impl InMemorySubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored subscriptions across all tenants
    pub async fn len(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscriptions.read().await.is_empty()
    }
}

#[async_trait]
impl SubscriptionRegistry for InMemorySubscriptionRegistry {
    async fn get(
        &self,
        tenant_id: &str,
        webhook_id: &str,
    ) -> Result<Option<Subscription>, WebhookError> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions.get(&key(tenant_id, webhook_id)).cloned())
    }

    async fn find_by_webhook_id(
        &self,
        webhook_id: &str,
    ) -> Result<Option<Subscription>, WebhookError> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions
            .values()
            .find(|s| s.webhook_id == webhook_id)
            .cloned())
    }

    async fn list(&self, tenant_id: &str) -> Result<Vec<Subscription>, WebhookError> {
        let subscriptions = self.subscriptions.read().await;
        let mut found: Vec<Subscription> = subscriptions
            .values()
            .filter(|s| s.tenant_id == tenant_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.webhook_id.cmp(&b.webhook_id))
        });
        Ok(found)
    }

    async fn find_enabled_for_event(
        &self,
        tenant_id: &str,
        event_type: &str,
    ) -> Result<Vec<Subscription>, WebhookError> {
        let subscriptions = self.subscriptions.read().await;
        let mut matching: Vec<Subscription> = subscriptions
            .values()
            .filter(|s| s.tenant_id == tenant_id && s.matches_event(event_type))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.webhook_id.cmp(&b.webhook_id));
        Ok(matching)
    }

    async fn create(&self, subscription: Subscription) -> Result<Subscription, WebhookError> {
        let mut subscriptions = self.subscriptions.write().await;
        let key = key(&subscription.tenant_id, &subscription.webhook_id);
        if subscriptions.contains_key(&key) {
            return Err(WebhookError::Validation(format!(
                "Webhook {} already exists",
                subscription.webhook_id
            )));
        }

        debug!(
            tenant_id = %subscription.tenant_id,
            webhook_id = %subscription.webhook_id,
            "Subscription stored"
        );
        subscriptions.insert(key, subscription.clone());
        Ok(subscription)
    }

    async fn update(
        &self,
        tenant_id: &str,
        webhook_id: &str,
        update: SubscriptionUpdate,
        updated_by: &str,
    ) -> Result<Subscription, WebhookError> {
        let mut subscriptions = self.subscriptions.write().await;
        let subscription = subscriptions
            .get_mut(&key(tenant_id, webhook_id))
            .ok_or_else(|| WebhookError::webhook_not_found(webhook_id))?;

        subscription.apply(update, updated_by);
        Ok(subscription.clone())
    }

    async fn replace_secret(
        &self,
        tenant_id: &str,
        webhook_id: &str,
        encrypted_secret: String,
        updated_by: &str,
    ) -> Result<Subscription, WebhookError> {
        let mut subscriptions = self.subscriptions.write().await;
        let subscription = subscriptions
            .get_mut(&key(tenant_id, webhook_id))
            .ok_or_else(|| WebhookError::webhook_not_found(webhook_id))?;

        subscription.replace_secret(encrypted_secret, updated_by);
        Ok(subscription.clone())
    }

    async fn delete(&self, tenant_id: &str, webhook_id: &str) -> Result<(), WebhookError> {
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions
            .remove(&key(tenant_id, webhook_id))
            .map(|_| ())
            .ok_or_else(|| WebhookError::webhook_not_found(webhook_id))
    }
}
