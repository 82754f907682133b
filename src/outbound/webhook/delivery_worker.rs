use futures::StreamExt;
use futures::stream;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};
use webhook_audit::{AuditLog, DeliveryEventDraft, DeliveryEventStatus};

use super::hmac_signer::HmacSigner;
use super::http_client::{DeliveryResponse, WebhookHttpClient};
use super::schemas::SignedMessage;
use crate::domain::job::DeliveryJob;
use crate::domain::ports::{DeliveryQueue, MAX_BATCH_SIZE, QueueMessage, SubscriptionRegistry};
use crate::error::WebhookError;
use crate::secrets::SecretManager;

/// Tuning for a pool of delivery workers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Messages pulled per invocation, at most [`MAX_BATCH_SIZE`]
    pub batch_size: usize,

    /// Jobs of one batch processed at the same time
    pub concurrency: usize,

    /// Wall-clock budget of one invocation
    pub invocation_budget: Duration,

    /// Sleep between polls of an empty queue
    pub poll_interval: Duration,

    /// Worker loops running at once
    pub workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            concurrency: 10,
            invocation_budget: Duration::from_secs(55),
            poll_interval: Duration::from_millis(250),
            workers: 2,
        }
    }
}

/// What the queue should do with one message after processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Delivered with a 2xx; acknowledged
    Delivered,

    /// Terminal failure; acknowledged so it is never redelivered
    Rejected,

    /// Retryable failure; handed back to the queue for backoff
    Retry,

    /// Budget ran out before the job settled; left for the visibility timeout
    Unfinished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub message_id: String,
    pub webhook_id: Option<String>,
    pub outcome: ItemOutcome,
    pub error: Option<String>,
}

impl ItemReport {
    fn new(message: &QueueMessage, outcome: ItemOutcome) -> Self {
        Self {
            message_id: message.message_id.clone(),
            webhook_id: None,
            outcome,
            error: None,
        }
    }
}

/// Per-item results of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub items: Vec<ItemReport>,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn count(&self, outcome: ItemOutcome) -> usize {
        self.items.iter().filter(|i| i.outcome == outcome).count()
    }

    /// Items that were not delivered, whatever happens to them next
    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items
            .iter()
            .filter(|i| i.outcome != ItemOutcome::Delivered)
    }

    /// Items the queue will hand out again
    pub fn redelivered(&self) -> impl Iterator<Item = &ItemReport> {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Retry | ItemOutcome::Unfinished))
    }
}

/// Why an attempt did not produce a 2xx
struct AttemptFailure {
    error: WebhookError,
    response_body: Option<String>,
}

impl From<WebhookError> for AttemptFailure {
    fn from(error: WebhookError) -> Self {
        Self {
            error,
            response_body: None,
        }
    }
}

/// Consumes delivery jobs: validate, deliver, persist.
pub struct DeliveryWorker {
    registry: Arc<dyn SubscriptionRegistry>,
    secrets: SecretManager,
    audit: AuditLog,
    queue: Arc<dyn DeliveryQueue>,
    http_client: WebhookHttpClient,
    config: WorkerConfig,
}

impl DeliveryWorker {
    pub fn new(
        registry: Arc<dyn SubscriptionRegistry>,
        secrets: SecretManager,
        audit: AuditLog,
        queue: Arc<dyn DeliveryQueue>,
        http_client: WebhookHttpClient,
    ) -> Self {
        Self {
            registry,
            secrets,
            audit,
            queue,
            http_client,
            config: WorkerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = WorkerConfig {
            batch_size: config.batch_size.clamp(1, MAX_BATCH_SIZE),
            concurrency: config.concurrency.max(1),
            workers: config.workers.max(1),
            ..config
        };
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Start `workers` polling loops that stop once `shutdown` flips to `true`
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            workers = self.config.workers,
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            "Delivery workers starting"
        );

        (0..self.config.workers)
            .map(|worker| {
                let this = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { this.run_loop(worker, shutdown).await })
            })
            .collect()
    }

    async fn run_loop(&self, worker: usize, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let idle = match self.run_once().await {
                Ok(report) => report.is_empty(),
                Err(e) => {
                    error!(worker = worker, error = %e, "Delivery invocation failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!(worker = worker, "Delivery worker stopped");
    }

    /// One invocation: receive a batch, process it, settle it with the queue
    pub async fn run_once(&self) -> Result<BatchReport, WebhookError> {
        let messages = self.queue.receive(self.config.batch_size).await?;
        if messages.is_empty() {
            return Ok(BatchReport::default());
        }

        let report = self.process_batch(messages).await;
        self.settle(&report).await;
        Ok(report)
    }

    /// Process a batch with bounded concurrency inside the invocation budget.
    ///
    /// Jobs still running when the budget lapses are reported as
    /// [`ItemOutcome::Unfinished`].
    pub async fn process_batch(&self, messages: Vec<QueueMessage>) -> BatchReport {
        let deadline = Instant::now() + self.config.invocation_budget;
        let mut items = Vec::with_capacity(messages.len());

        {
            let mut processing = stream::iter(messages.iter().cloned())
                .map(|message| async move { self.process_message(&message).await })
                .buffer_unordered(self.config.concurrency);

            loop {
                match timeout_at(deadline, processing.next()).await {
                    Ok(Some(item)) => items.push(item),
                    Ok(None) => break,
                    Err(_) => {
                        warn!(
                            settled = items.len(),
                            total = messages.len(),
                            "Invocation budget exhausted, leaving remaining jobs for redelivery"
                        );
                        break;
                    }
                }
            }
        }

        let settled: HashSet<String> = items.iter().map(|i| i.message_id.clone()).collect();
        items.extend(
            messages
                .iter()
                .filter(|m| !settled.contains(&m.message_id))
                .map(|m| ItemReport::new(m, ItemOutcome::Unfinished)),
        );

        BatchReport { items }
    }

    /// Acknowledge settled items and hand retryable ones back to the queue
    pub async fn settle(&self, report: &BatchReport) {
        for item in &report.items {
            let result = match item.outcome {
                ItemOutcome::Delivered | ItemOutcome::Rejected => {
                    self.queue.ack(&item.message_id).await
                }
                ItemOutcome::Retry => self.queue.fail(&item.message_id).await,
                ItemOutcome::Unfinished => continue,
            };

            if let Err(e) = result {
                warn!(
                    message_id = %item.message_id,
                    outcome = ?item.outcome,
                    error = %e,
                    "Failed to settle queue message"
                );
            }
        }
    }

    /// Run one job through validate, deliver and persist
    pub async fn process_message(&self, message: &QueueMessage) -> ItemReport {
        let job = match DeliveryJob::parse(&message.body) {
            Ok(job) => job,
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    error = %e,
                    "Dropping malformed delivery job"
                );
                return ItemReport {
                    error: Some(e.to_string()),
                    ..ItemReport::new(message, ItemOutcome::Rejected)
                };
            }
        };

        // Redeliveries of the same job carry the same webhook-id
        let webhook_message_id = job
            .message_id
            .clone()
            .unwrap_or_else(|| format!("msg_{}", message.message_id));
        let attempt = message.receive_count.max(1);

        debug!(
            tenant_id = %job.tenant_id,
            webhook_id = %job.webhook_id,
            message_id = %webhook_message_id,
            attempt = attempt,
            "Processing delivery job"
        );

        let draft = DeliveryEventDraft::new(
            job.tenant_id.as_str(),
            job.webhook_id.as_str(),
            webhook_message_id.as_str(),
            job.event_type.as_str(),
            DeliveryEventStatus::Success,
            job.payload.clone(),
        )
        .with_attempts(attempt);

        let report = ItemReport {
            webhook_id: Some(job.webhook_id.clone()),
            ..ItemReport::new(message, ItemOutcome::Delivered)
        };

        match self.deliver(&job, &webhook_message_id).await {
            Ok(response) => {
                info!(
                    tenant_id = %job.tenant_id,
                    webhook_id = %job.webhook_id,
                    message_id = %webhook_message_id,
                    attempt = attempt,
                    status_code = response.status_code,
                    response_time_ms = response.response_time_ms,
                    "Webhook delivered"
                );

                let draft = draft
                    .with_status_code(response.status_code)
                    .with_response_body(response.body);
                if let Err(e) = self.audit.append(draft).await {
                    // Delivery already happened; redelivering would duplicate it
                    error!(
                        tenant_id = %job.tenant_id,
                        webhook_id = %job.webhook_id,
                        message_id = %webhook_message_id,
                        error = %e,
                        "Failed to record successful delivery"
                    );
                }
                report
            }
            Err(failure) => {
                let outcome = if failure.error.is_retryable() {
                    ItemOutcome::Retry
                } else {
                    ItemOutcome::Rejected
                };

                warn!(
                    tenant_id = %job.tenant_id,
                    webhook_id = %job.webhook_id,
                    message_id = %webhook_message_id,
                    attempt = attempt,
                    error = %failure.error,
                    retry = outcome == ItemOutcome::Retry,
                    "Webhook delivery failed"
                );

                let mut draft = DeliveryEventDraft {
                    status: DeliveryEventStatus::Failure,
                    ..draft
                }
                .with_error(failure.error.to_string());
                if let WebhookError::Delivery {
                    status_code: Some(code),
                    ..
                } = &failure.error
                {
                    draft = draft.with_status_code(*code);
                }
                if let Some(body) = failure.response_body {
                    draft = draft.with_response_body(body);
                }

                let outcome = match self.audit.append(draft).await {
                    Ok(_) => outcome,
                    Err(e) => {
                        error!(
                            webhook_id = %job.webhook_id,
                            message_id = %webhook_message_id,
                            error = %e,
                            "Failed to record failed delivery"
                        );
                        ItemOutcome::Retry
                    }
                };

                ItemReport {
                    outcome,
                    error: Some(failure.error.to_string()),
                    ..report
                }
            }
        }
    }

    async fn deliver(
        &self,
        job: &DeliveryJob,
        message_id: &str,
    ) -> Result<DeliveryResponse, AttemptFailure> {
        let subscription = self
            .registry
            .get(&job.tenant_id, &job.webhook_id)
            .await?
            .ok_or_else(|| WebhookError::webhook_not_found(&job.webhook_id))?;

        if !subscription.is_enabled() {
            return Err(WebhookError::Disabled(job.webhook_id.clone()).into());
        }

        let secret = self.secrets.decrypt(&subscription.secret).await?;
        let signer =
            HmacSigner::new(&secret).map_err(|e| WebhookError::Crypto(e.to_string()))?;
        let signed = SignedMessage::build(
            &signer,
            message_id.to_string(),
            &job.event_type,
            job.payload.clone(),
            OffsetDateTime::now_utc(),
        )?;

        self.http_client
            .send_webhook(&subscription.endpoint, &signed)
            .await
            .map_err(|e| {
                let status_code = e.status_code();
                let message = match status_code {
                    Some(code) => format!("Receiver responded with HTTP {code}"),
                    None => e.to_string(),
                };
                AttemptFailure {
                    response_body: e.response_body().map(str::to_string),
                    error: WebhookError::Delivery {
                        status_code,
                        message,
                    },
                }
            })
    }
}
