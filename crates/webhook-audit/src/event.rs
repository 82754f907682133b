//! # Delivery Event Schema
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

// ============================================================================
// DeliveryEventStatus
// ============================================================================

/// Outcome of one completed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryEventStatus {
    Pending,
    Success,
    Failure,
}

impl DeliveryEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl std::fmt::Display for DeliveryEventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DeliveryEvent
// ============================================================================

/// Immutable audit record of a delivery attempt outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub event_id: String,
    pub message_id: String,
    pub webhook_id: String,
    pub tenant_id: String,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<u16>,
    pub attempts: u32,
    pub status: DeliveryEventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    pub message_payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// ============================================================================
// DeliveryEventDraft
// ============================================================================

/// A delivery event that has not been appended yet.
///
/// `event_id` and `created_at` are filled in on append when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryEventDraft {
    pub event_id: Option<String>,
    pub message_id: String,
    pub webhook_id: String,
    pub tenant_id: String,
    pub event_type: String,
    pub http_status_code: Option<u16>,
    pub attempts: u32,
    pub status: DeliveryEventStatus,
    pub response_body: Option<String>,
    pub message_payload: Value,
    pub error_message: Option<String>,
    pub created_at: Option<OffsetDateTime>,
}

impl DeliveryEventDraft {
    /// Create a draft with the given outcome and a single attempt.
    pub fn new(
        tenant_id: impl Into<String>,
        webhook_id: impl Into<String>,
        message_id: impl Into<String>,
        event_type: impl Into<String>,
        status: DeliveryEventStatus,
        message_payload: Value,
    ) -> Self {
        Self {
            event_id: None,
            message_id: message_id.into(),
            webhook_id: webhook_id.into(),
            tenant_id: tenant_id.into(),
            event_type: event_type.into(),
            http_status_code: None,
            attempts: 1,
            status,
            response_body: None,
            message_payload,
            error_message: None,
            created_at: None,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.http_status_code = Some(status_code);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_response_body(mut self, body: impl Into<String>) -> Self {
        self.response_body = Some(body.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }

    pub fn with_created_at(mut self, created_at: OffsetDateTime) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Materialise the record, generating the missing identifiers.
    pub fn into_event(self) -> DeliveryEvent {
        DeliveryEvent {
            event_id: self
                .event_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            message_id: self.message_id,
            webhook_id: self.webhook_id,
            tenant_id: self.tenant_id,
            event_type: self.event_type,
            http_status_code: self.http_status_code,
            attempts: self.attempts,
            status: self.status,
            response_body: self.response_body,
            message_payload: self.message_payload,
            error_message: self.error_message,
            created_at: self.created_at.unwrap_or_else(OffsetDateTime::now_utc),
        }
    }
}
