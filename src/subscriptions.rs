//! Tenant-facing management of webhook subscriptions.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::ports::SubscriptionRegistry;
use crate::domain::subscription::{NewSubscription, Subscription, SubscriptionUpdate};
use crate::error::WebhookError;
use crate::secrets::{RotatedSecret, SecretManager};

/// A newly registered subscription together with its plaintext secret.
///
/// This is the only response that carries the secret unless revealing is enabled.
#[derive(Clone, Serialize)]
pub struct CreatedSubscription {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub secret: String,
}

impl std::fmt::Debug for CreatedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatedSubscription")
            .field("subscription", &self.subscription)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Serialize)]
pub struct RevealedSecret {
    pub webhook_id: String,
    pub secret: String,
}

impl std::fmt::Debug for RevealedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevealedSecret")
            .field("webhook_id", &self.webhook_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct SubscriptionService {
    registry: Arc<dyn SubscriptionRegistry>,
    secrets: SecretManager,
    allow_reveal: bool,
}

impl SubscriptionService {
    pub fn new(registry: Arc<dyn SubscriptionRegistry>, secrets: SecretManager) -> Self {
        Self {
            registry,
            secrets,
            allow_reveal: false,
        }
    }

    /// Permit `reveal_secret` to return decrypted secrets
    pub fn allow_reveal(mut self, allow: bool) -> Self {
        self.allow_reveal = allow;
        self
    }

    pub async fn create(
        &self,
        tenant_id: &str,
        input: NewSubscription,
    ) -> Result<CreatedSubscription, WebhookError> {
        input.validate()?;

        let webhook_id = Uuid::new_v4().to_string();
        let secret = SecretManager::generate();
        let encrypted = self.secrets.seal(&secret).await?;

        let subscription = self
            .registry
            .create(Subscription::new(
                tenant_id.to_string(),
                webhook_id,
                input,
                encrypted,
            ))
            .await?;

        info!(
            tenant_id = %tenant_id,
            webhook_id = %subscription.webhook_id,
            event_types = subscription.event_types.len(),
            "Subscription created"
        );

        Ok(CreatedSubscription {
            subscription,
            secret,
        })
    }

    pub async fn get(&self, tenant_id: &str, webhook_id: &str) -> Result<Subscription, WebhookError> {
        self.registry
            .get(tenant_id, webhook_id)
            .await?
            .ok_or_else(|| WebhookError::webhook_not_found(webhook_id))
    }

    pub async fn list(&self, tenant_id: &str) -> Result<Vec<Subscription>, WebhookError> {
        self.registry.list(tenant_id).await
    }

    pub async fn update(
        &self,
        tenant_id: &str,
        webhook_id: &str,
        update: SubscriptionUpdate,
        updated_by: &str,
    ) -> Result<Subscription, WebhookError> {
        update.validate()?;
        let subscription = self
            .registry
            .update(tenant_id, webhook_id, update, updated_by)
            .await?;

        info!(tenant_id = %tenant_id, webhook_id = %webhook_id, "Subscription updated");
        Ok(subscription)
    }

    pub async fn delete(&self, tenant_id: &str, webhook_id: &str) -> Result<(), WebhookError> {
        self.registry.delete(tenant_id, webhook_id).await?;
        info!(tenant_id = %tenant_id, webhook_id = %webhook_id, "Subscription deleted");
        Ok(())
    }

    /// Decrypt and return the current secret, when the deployment allows it
    pub async fn reveal_secret(
        &self,
        tenant_id: &str,
        webhook_id: &str,
    ) -> Result<RevealedSecret, WebhookError> {
        if !self.allow_reveal {
            return Err(WebhookError::Forbidden(
                "revealing signing secrets is disabled".to_string(),
            ));
        }

        let subscription = self.get(tenant_id, webhook_id).await?;
        let secret = self.secrets.decrypt(&subscription.secret).await?;

        warn!(tenant_id = %tenant_id, webhook_id = %webhook_id, "Signing secret revealed");
        Ok(RevealedSecret {
            webhook_id: subscription.webhook_id,
            secret,
        })
    }

    pub async fn rotate_secret(
        &self,
        tenant_id: &str,
        webhook_id: &str,
        updated_by: &str,
    ) -> Result<RotatedSecret, WebhookError> {
        self.secrets
            .rotate(self.registry.as_ref(), tenant_id, webhook_id, updated_by)
            .await
    }
}
