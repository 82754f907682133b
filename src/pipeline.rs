use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use webhook_audit::{AuditLog, InMemoryAuditStore};

use crate::config::Config;
use crate::error::WebhookError;
use crate::infrastructure::{InMemoryDeliveryQueue, InMemorySubscriptionRegistry, LocalKeyManagement};
use crate::outbound::webhook::{DeliveryWorker, Dispatcher, WebhookHttpClient};
use crate::secrets::SecretManager;
use crate::subscriptions::SubscriptionService;

/// Every collaborator of the webhook pipeline, wired from configuration
#[derive(Clone)]
pub struct Pipeline {
    pub registry: Arc<InMemorySubscriptionRegistry>,
    pub queue: Arc<InMemoryDeliveryQueue>,
    pub audit: AuditLog,
    pub secrets: SecretManager,
    pub subscriptions: SubscriptionService,
    pub dispatcher: Arc<Dispatcher>,
    pub worker: Arc<DeliveryWorker>,
}

impl Pipeline {
    pub fn from_config(config: &Config) -> Result<Self, WebhookError> {
        let key_id = config.secrets.kms_key_id.trim();
        if key_id.is_empty() {
            return Err(WebhookError::Configuration(
                "secrets.kms_key_id is not set".to_string(),
            ));
        }

        let kms = match &config.secrets.master_key {
            Some(key) => LocalKeyManagement::new().with_base64_key(key_id, key),
            None => {
                warn!(
                    key_id = %key_id,
                    "No master key configured, secrets will not survive a restart"
                );
                LocalKeyManagement::new().with_ephemeral_key(key_id)
            }
        }
        .map_err(|e| WebhookError::Configuration(e.to_string()))?;

        let registry = Arc::new(InMemorySubscriptionRegistry::new());
        let queue = Arc::new(
            InMemoryDeliveryQueue::new(config.queue.name.clone())
                .with_retry_strategy(config.retry_strategy())
                .with_visibility_timeout(Duration::from_secs(config.queue.visibility_timeout_secs)),
        );
        let audit = AuditLog::new(Arc::new(InMemoryAuditStore::new()));
        let secrets = SecretManager::new(Arc::new(kms), key_id);

        let subscriptions = SubscriptionService::new(registry.clone(), secrets.clone())
            .allow_reveal(config.secrets.allow_reveal);
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            queue.clone(),
            config.queue.name.clone(),
        ));

        let http_client =
            WebhookHttpClient::with_timeout(Duration::from_secs(config.delivery.request_timeout_secs))
                .map_err(|e| WebhookError::Configuration(e.to_string()))?
                .with_max_body_bytes(config.delivery.max_response_body_bytes);
        let worker = Arc::new(
            DeliveryWorker::new(
                registry.clone(),
                secrets.clone(),
                audit.clone(),
                queue.clone(),
                http_client,
            )
            .with_config(config.worker_config()),
        );

        Ok(Self {
            registry,
            queue,
            audit,
            secrets,
            subscriptions,
            dispatcher,
            worker,
        })
    }
}
