use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AuditError;
use crate::event::DeliveryEvent;

/// Position of the last event of a page, in `(created_at, event_id)` order.
///
/// Travels to callers as an opaque URL-safe token.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "t", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "id")]
    pub event_id: String,
}

impl Cursor {
    pub fn after(event: &DeliveryEvent) -> Self {
        Self {
            created_at: event.created_at,
            event_id: event.event_id.clone(),
        }
    }

    pub fn encode(&self) -> Result<String, AuditError> {
        let json =
            serde_json::to_vec(self).map_err(|e| AuditError::InvalidCursor(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(token: &str) -> Result<Self, AuditError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| AuditError::InvalidCursor(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| AuditError::InvalidCursor(e.to_string()))
    }

    /// Sort key of an event, comparable with a decoded cursor.
    pub fn key_of(event: &DeliveryEvent) -> (OffsetDateTime, String) {
        (event.created_at, event.event_id.clone())
    }
}
