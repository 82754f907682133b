use thiserror::Error;
use webhook_audit::AuditError;

use crate::domain::ports::{KmsError, QueueError};

/// Failure taxonomy shared by the dispatch and delivery pipeline.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    #[error("Webhook {0} is disabled")]
    Disabled(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Delivery failed: {message}")]
    Delivery {
        status_code: Option<u16>,
        message: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl WebhookError {
    pub fn webhook_not_found(webhook_id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: "Webhook",
            id: webhook_id.into(),
        }
    }

    pub fn event_not_found(event_id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: "Event",
            id: event_id.into(),
        }
    }

    /// Whether the queue should redeliver a job that failed with this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(_) | Self::Crypto(_) | Self::Delivery { .. } => true,
            Self::Configuration(_) | Self::NotFound { .. } | Self::Disabled(_) => false,
            Self::Validation(_) | Self::Forbidden(_) => false,
        }
    }
}

impl From<AuditError> for WebhookError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::NotFound(id) => Self::event_not_found(id),
            AuditError::InvalidCursor(_) | AuditError::InvalidLimit(_) => {
                Self::Validation(err.to_string())
            }
            AuditError::Store(_) | AuditError::Duplicate(_) => Self::Store(err.to_string()),
        }
    }
}

impl From<KmsError> for WebhookError {
    fn from(err: KmsError) -> Self {
        Self::Crypto(err.to_string())
    }
}

impl From<QueueError> for WebhookError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::UnknownQueue(_) => Self::Configuration(err.to_string()),
            _ => Self::Store(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(WebhookError::Store("down".into()).is_retryable());
        assert!(WebhookError::Crypto("kms".into()).is_retryable());
        assert!(
            WebhookError::Delivery {
                status_code: Some(503),
                message: "unavailable".into()
            }
            .is_retryable()
        );

        assert!(!WebhookError::webhook_not_found("wh-1").is_retryable());
        assert!(!WebhookError::Disabled("wh-1".into()).is_retryable());
        assert!(!WebhookError::Validation("bad".into()).is_retryable());
        assert!(!WebhookError::Configuration("missing".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            WebhookError::webhook_not_found("wh-1").to_string(),
            "Webhook wh-1 not found"
        );
        assert_eq!(
            WebhookError::Disabled("wh-1".into()).to_string(),
            "Webhook wh-1 is disabled"
        );
    }

    #[test]
    fn test_audit_error_mapping() {
        assert!(matches!(
            WebhookError::from(AuditError::NotFound("evt-1".into())),
            WebhookError::NotFound { resource: "Event", .. }
        ));
        assert!(matches!(
            WebhookError::from(AuditError::InvalidCursor("x".into())),
            WebhookError::Validation(_)
        ));
        assert!(matches!(
            WebhookError::from(AuditError::Store("x".into())),
            WebhookError::Store(_)
        ));
    }

    #[test]
    fn test_kms_and_queue_error_mapping() {
        assert!(matches!(
            WebhookError::from(KmsError::DecryptionFailed),
            WebhookError::Crypto(_)
        ));
        assert!(matches!(
            WebhookError::from(QueueError::UnknownQueue("q".into())),
            WebhookError::Configuration(_)
        ));
        assert!(matches!(
            WebhookError::from(QueueError::Unavailable("down".into())),
            WebhookError::Store(_)
        ));
    }
}
