//! AES-256-GCM keyring implementing [`KeyManagement`] in process.
//!
//! Ciphertext layout (base64 encoded):
//! `[key_id length: u8][key_id][nonce: 12 bytes][sealed plaintext]`.
//! The key id is bound as associated data, so a blob cannot be replayed under
//! another key.

use aes_gcm::aead::{Aead, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, KeyInit};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use std::collections::HashMap;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::domain::ports::{KeyManagement, KmsError};

const NONCE_LEN: usize = 12;

/// Key bytes scrubbed from memory on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct MasterKey([u8; 32]);

#[derive(Clone, Default)]
pub struct LocalKeyManagement {
    keys: HashMap<String, MasterKey>,
}

impl std::fmt::Debug for LocalKeyManagement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyManagement")
            .field("key_ids", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LocalKeyManagement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key under `key_id`
    pub fn with_key(mut self, key_id: impl Into<String>, key: [u8; 32]) -> Result<Self, KmsError> {
        let key_id = key_id.into();
        if key_id.is_empty() || key_id.len() > u8::MAX as usize {
            return Err(KmsError::UnknownKey(key_id));
        }
        self.keys.insert(key_id, MasterKey(key));
        Ok(self)
    }

    /// Register a base64-encoded 32-byte key
    pub fn with_base64_key(self, key_id: impl Into<String>, key_b64: &str) -> Result<Self, KmsError> {
        let mut bytes = STANDARD
            .decode(key_b64.trim())
            .map_err(|e| KmsError::UnknownKey(format!("master key is not base64: {e}")))?;
        if bytes.len() != 32 {
            bytes.zeroize();
            return Err(KmsError::UnknownKey(
                "master key must be exactly 32 bytes".to_string(),
            ));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        self.with_key(key_id, key)
    }

    /// Register a random key that lives only as long as this process
    pub fn with_ephemeral_key(self, key_id: impl Into<String>) -> Result<Self, KmsError> {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        self.with_key(key_id, key)
    }

    fn cipher(&self, key_id: &str) -> Result<Aes256Gcm, KmsError> {
        let key = self
            .keys
            .get(key_id)
            .ok_or_else(|| KmsError::UnknownKey(key_id.to_string()))?;
        Aes256Gcm::new_from_slice(&key.0).map_err(|_| KmsError::UnknownKey(key_id.to_string()))
    }
}

#[async_trait]
impl KeyManagement for LocalKeyManagement {
    async fn encrypt(&self, plaintext: &[u8], key_id: &str) -> Result<String, KmsError> {
        let cipher = self.cipher(key_id)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: key_id.as_bytes(),
                },
            )
            .map_err(|_| KmsError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(1 + key_id.len() + NONCE_LEN + sealed.len());
        blob.push(key_id.len() as u8);
        blob.extend_from_slice(key_id.as_bytes());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);

        Ok(STANDARD.encode(blob))
    }

    async fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, KmsError> {
        let blob = STANDARD
            .decode(ciphertext)
            .map_err(|e| KmsError::MalformedCiphertext(e.to_string()))?;

        let (&id_len, rest) = blob
            .split_first()
            .ok_or_else(|| KmsError::MalformedCiphertext("empty blob".to_string()))?;
        let id_len = id_len as usize;
        if rest.len() < id_len + NONCE_LEN {
            return Err(KmsError::MalformedCiphertext("truncated blob".to_string()));
        }

        let (key_id, rest) = rest.split_at(id_len);
        let key_id = std::str::from_utf8(key_id)
            .map_err(|_| KmsError::MalformedCiphertext("key id is not utf-8".to_string()))?;
        let (nonce, sealed) = rest.split_at(NONCE_LEN);

        self.cipher(key_id)?
            .decrypt(
                aes_gcm::Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: key_id.as_bytes(),
                },
            )
            .map_err(|_| KmsError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kms() -> LocalKeyManagement {
        LocalKeyManagement::new()
            .with_key("key-a", [7u8; 32])
            .and_then(|k| k.with_key("key-b", [9u8; 32]))
            .unwrap()
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let kms = kms();
        let blob = kms.encrypt(b"whsec_abc", "key-a").await.unwrap();

        assert!(!blob.contains("whsec_abc"));
        assert_eq!(kms.decrypt(&blob).await.unwrap(), b"whsec_abc");
    }

    #[tokio::test]
    async fn test_same_plaintext_encrypts_differently() {
        let kms = kms();
        let a = kms.encrypt(b"same", "key-a").await.unwrap();
        let b = kms.encrypt(b"same", "key-a").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_blob_records_its_key() {
        let kms = kms();
        let blob = kms.encrypt(b"secret", "key-b").await.unwrap();
        assert_eq!(kms.decrypt(&blob).await.unwrap(), b"secret");

        let only_a = LocalKeyManagement::new().with_key("key-a", [7u8; 32]).unwrap();
        assert!(matches!(
            only_a.decrypt(&blob).await,
            Err(KmsError::UnknownKey(id)) if id == "key-b"
        ));
    }

    #[tokio::test]
    async fn test_unknown_key_on_encrypt() {
        let result = kms().encrypt(b"x", "missing").await;
        assert!(matches!(result, Err(KmsError::UnknownKey(_))));
    }

    #[tokio::test]
    async fn test_malformed_ciphertext() {
        let kms = kms();
        assert!(matches!(
            kms.decrypt("***").await,
            Err(KmsError::MalformedCiphertext(_))
        ));
        assert!(matches!(
            kms.decrypt("").await,
            Err(KmsError::MalformedCiphertext(_))
        ));
        assert!(matches!(
            kms.decrypt(&STANDARD.encode([5u8, b'k'])).await,
            Err(KmsError::MalformedCiphertext(_))
        ));
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_fails() {
        let kms = kms();
        let blob = kms.encrypt(b"secret", "key-a").await.unwrap();
        let mut bytes = STANDARD.decode(&blob).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        assert!(matches!(
            kms.decrypt(&STANDARD.encode(bytes)).await,
            Err(KmsError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_base64_key_must_be_32_bytes() {
        let short = STANDARD.encode([1u8; 16]);
        assert!(LocalKeyManagement::new().with_base64_key("k", &short).is_err());

        let ok = STANDARD.encode([1u8; 32]);
        assert!(LocalKeyManagement::new().with_base64_key("k", &ok).is_ok());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let debug = format!("{:?}", kms());
        assert!(debug.contains("key-a"));
        assert!(!debug.contains("7, 7"));
    }
}
