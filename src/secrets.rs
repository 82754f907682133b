//! Signing-secret lifecycle: generation, envelope encryption and rotation.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::info;

use crate::domain::ports::{KeyManagement, SubscriptionRegistry};
use crate::error::WebhookError;
use crate::outbound::webhook::hmac_signer::SECRET_PREFIX;

/// Random bytes behind every generated secret
const SECRET_BYTES: usize = 32;

/// Result of a rotation; the only time the new plaintext leaves the service
#[derive(Clone, Serialize)]
pub struct RotatedSecret {
    pub webhook_id: String,
    pub secret: String,
    #[serde(with = "time::serde::rfc3339")]
    pub rotated_at: OffsetDateTime,
}

impl std::fmt::Debug for RotatedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatedSecret")
            .field("webhook_id", &self.webhook_id)
            .field("secret", &"<redacted>")
            .field("rotated_at", &self.rotated_at)
            .finish()
    }
}

#[derive(Clone)]
pub struct SecretManager {
    kms: Arc<dyn KeyManagement>,
    key_id: String,
}

impl SecretManager {
    /// `key_id` names the managed key new secrets are encrypted under
    pub fn new(kms: Arc<dyn KeyManagement>, key_id: impl Into<String>) -> Self {
        Self {
            kms,
            key_id: key_id.into(),
        }
    }

    /// Generate a fresh `whsec_`-prefixed secret from the OS RNG
    pub fn generate() -> String {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        format!("{SECRET_PREFIX}{}", STANDARD.encode(bytes))
    }

    /// Encrypt under an explicit key
    pub async fn encrypt(&self, plaintext: &str, key_id: &str) -> Result<String, WebhookError> {
        Ok(self.kms.encrypt(plaintext.as_bytes(), key_id).await?)
    }

    /// Encrypt under the configured key
    pub async fn seal(&self, plaintext: &str) -> Result<String, WebhookError> {
        if self.key_id.trim().is_empty() {
            return Err(WebhookError::Configuration(
                "secrets.kms_key_id is not set".to_string(),
            ));
        }
        self.encrypt(plaintext, &self.key_id).await
    }

    pub async fn decrypt(&self, ciphertext: &str) -> Result<String, WebhookError> {
        let bytes = self.kms.decrypt(ciphertext).await?;
        String::from_utf8(bytes)
            .map_err(|_| WebhookError::Crypto("decrypted secret is not valid utf-8".to_string()))
    }

    /// Replace a subscription's secret, returning the new plaintext.
    ///
    /// The previous secret stops producing valid signatures as soon as the
    /// registry write lands.
    pub async fn rotate(
        &self,
        registry: &dyn SubscriptionRegistry,
        tenant_id: &str,
        webhook_id: &str,
        updated_by: &str,
    ) -> Result<RotatedSecret, WebhookError> {
        let secret = Self::generate();
        let encrypted = self.seal(&secret).await?;

        registry
            .replace_secret(tenant_id, webhook_id, encrypted, updated_by)
            .await?;

        info!(
            tenant_id = %tenant_id,
            webhook_id = %webhook_id,
            "Signing secret rotated"
        );

        Ok(RotatedSecret {
            webhook_id: webhook_id.to_string(),
            secret,
            rotated_at: OffsetDateTime::now_utc(),
        })
    }
}
