use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;
use url::Url;

use crate::error::WebhookError;

/// Whether a subscription currently receives deliveries
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Enabled,

    Disabled,
}

/// Tenant-owned webhook registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    pub tenant_id: String,

    pub webhook_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub endpoint: String,

    /// Signing secret, encrypted by the key-management service
    #[serde(skip_serializing, default)]
    pub secret: String,

    pub event_types: BTreeSet<String>,

    pub status: SubscriptionStatus,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    pub created_by: String,

    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl Subscription {
    /// Build an enabled subscription from validated input and an encrypted secret
    pub fn new(
        tenant_id: String,
        webhook_id: String,
        input: NewSubscription,
        encrypted_secret: String,
    ) -> Self {
        Self {
            tenant_id,
            webhook_id,
            name: input.name,
            endpoint: input.endpoint,
            secret: encrypted_secret,
            event_types: input.event_types.into_iter().collect(),
            status: SubscriptionStatus::Enabled,
            created_at: OffsetDateTime::now_utc(),
            created_by: input.created_by,
            updated_at: None,
            updated_by: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status == SubscriptionStatus::Enabled
    }

    /// Check if this subscription should receive a given event type.
    /// Matching is an exact string comparison.
    pub fn matches_event(&self, event_type: &str) -> bool {
        self.is_enabled() && self.event_types.contains(event_type)
    }

    /// Apply a partial update, stamping the modification metadata
    pub fn apply(&mut self, update: SubscriptionUpdate, updated_by: &str) {
        if let Some(name) = update.name {
            self.name = Some(name);
        }
        if let Some(endpoint) = update.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(event_types) = update.event_types {
            self.event_types = event_types.into_iter().collect();
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        self.touch(updated_by);
    }

    /// Swap in a freshly encrypted secret
    pub fn replace_secret(&mut self, encrypted_secret: String, updated_by: &str) {
        self.secret = encrypted_secret;
        self.touch(updated_by);
    }

    fn touch(&mut self, updated_by: &str) {
        self.updated_at = Some(OffsetDateTime::now_utc());
        self.updated_by = Some(updated_by.to_string());
    }
}

/// Input for registering a subscription
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewSubscription {
    #[serde(default)]
    pub name: Option<String>,

    pub endpoint: String,

    pub event_types: Vec<String>,

    /// Set from the authenticated caller, never from the request body
    #[serde(skip)]
    pub created_by: String,
}

impl NewSubscription {
    pub fn new(endpoint: impl Into<String>, event_types: Vec<String>) -> Self {
        Self {
            name: None,
            endpoint: endpoint.into(),
            event_types,
            created_by: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn created_by(mut self, actor: impl Into<String>) -> Self {
        self.created_by = actor.into();
        self
    }

    pub fn validate(&self) -> Result<(), WebhookError> {
        validate_endpoint(&self.endpoint)?;
        validate_event_types(&self.event_types)
    }
}

/// Partial update of a subscription; `None` leaves the field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub event_types: Option<Vec<String>>,

    #[serde(default)]
    pub status: Option<SubscriptionStatus>,
}

impl SubscriptionUpdate {
    pub fn status(status: SubscriptionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), WebhookError> {
        if let Some(endpoint) = &self.endpoint {
            validate_endpoint(endpoint)?;
        }
        if let Some(event_types) = &self.event_types {
            validate_event_types(event_types)?;
        }
        Ok(())
    }
}

/// Endpoints must be absolute http(s) URLs
pub fn validate_endpoint(endpoint: &str) -> Result<(), WebhookError> {
    let url = Url::parse(endpoint)
        .map_err(|e| WebhookError::Validation(format!("Invalid endpoint URL '{endpoint}': {e}")))?;

    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(()),
        scheme => Err(WebhookError::Validation(format!(
            "Endpoint must be an absolute http(s) URL, got scheme '{scheme}'"
        ))),
    }
}

fn validate_event_types(event_types: &[String]) -> Result<(), WebhookError> {
    if event_types.is_empty() {
        return Err(WebhookError::Validation(
            "event_types must not be empty".to_string(),
        ));
    }
    if event_types.iter().any(|t| t.trim().is_empty()) {
        return Err(WebhookError::Validation(
            "event_types must not contain blank entries".to_string(),
        ));
    }
    Ok(())
}
