use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WebhookError;

/// Queue-resident unit of work: one event for one subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryJob {
    pub tenant_id: String,

    pub webhook_id: String,

    pub event_type: String,

    pub payload: Value,

    /// Minted once at dispatch so that every redelivery of this job carries
    /// the same `webhook-id` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl DeliveryJob {
    pub fn new(
        tenant_id: impl Into<String>,
        webhook_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            webhook_id: webhook_id.into(),
            event_type: event_type.into(),
            payload,
            message_id: None,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Decode and validate a raw queue body.
    pub fn parse(body: &str) -> Result<Self, WebhookError> {
        let job: Self = serde_json::from_str(body)
            .map_err(|e| WebhookError::Validation(format!("Malformed delivery job: {e}")))?;

        for (field, value) in [
            ("tenant_id", &job.tenant_id),
            ("webhook_id", &job.webhook_id),
            ("event_type", &job.event_type),
        ] {
            if value.trim().is_empty() {
                return Err(WebhookError::Validation(format!(
                    "Malformed delivery job: {field} is empty"
                )));
            }
        }

        Ok(job)
    }

    pub fn to_body(&self) -> Result<String, WebhookError> {
        serde_json::to_string(self)
            .map_err(|e| WebhookError::Validation(format!("Unserializable payload: {e}")))
    }
}
