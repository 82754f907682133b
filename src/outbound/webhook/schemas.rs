use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use super::hmac_signer::HmacSigner;
use crate::error::WebhookError;

/// Canonical body POSTed to receivers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,

    pub data: Value,
}

impl WebhookPayload {
    /// Create a new webhook payload
    pub fn new(event_type: String, timestamp: OffsetDateTime, data: Value) -> Self {
        Self {
            event_type,
            timestamp,
            data,
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Mint a fresh `msg_`-prefixed message identifier
pub fn new_message_id() -> String {
    format!("msg_{}", Uuid::new_v4())
}

/// A fully signed request, ready to POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    /// `webhook-id` header
    pub message_id: String,

    /// `webhook-timestamp` header (RFC 3339)
    pub timestamp_header: String,

    /// `webhook-signature` header
    pub signature: String,

    /// Serialized [`WebhookPayload`]
    pub body: String,
}

impl SignedMessage {
    /// Build and sign the canonical body.
    ///
    /// The timestamp is truncated to whole seconds so that the header, the body
    /// and the signed unix time all agree.
    pub fn build(
        signer: &HmacSigner,
        message_id: String,
        event_type: &str,
        data: Value,
        timestamp: OffsetDateTime,
    ) -> Result<Self, WebhookError> {
        let timestamp = timestamp
            .replace_nanosecond(0)
            .map_err(|e| WebhookError::Validation(e.to_string()))?;

        let payload = WebhookPayload::new(event_type.to_string(), timestamp, data);
        let body = payload
            .to_json()
            .map_err(|e| WebhookError::Validation(format!("Unserializable payload: {e}")))?;
        let timestamp_header = timestamp
            .format(&Rfc3339)
            .map_err(|e| WebhookError::Validation(e.to_string()))?;
        let signature = signer.sign(&message_id, timestamp, &body);

        Ok(Self {
            message_id,
            timestamp_header,
            signature,
            body,
        })
    }
}
