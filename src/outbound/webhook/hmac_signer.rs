use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// Prefix carried by every generated signing secret
pub const SECRET_PREFIX: &str = "whsec_";

/// Version tag prepended to each signature in the `webhook-signature` header
pub const SIGNATURE_VERSION: &str = "v1";

/// Seconds a timestamp may run ahead of the verifier's clock
const MAX_FUTURE_SKEW_SECS: i64 = 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Invalid signing secret: {0}")]
    InvalidSecret(String),

    #[error("Timestamp too old: {age} seconds (max: {max_age})")]
    TimestampTooOld { age: i64, max_age: i64 },

    #[error("Timestamp is in the future: {0} seconds ahead")]
    TimestampInFuture(i64),

    #[error("Invalid signature header format: {0}")]
    MalformedHeader(String),

    #[error("No matching signature found")]
    NoMatchingSignature,
}

/// HMAC-SHA256 signer over `message_id.timestamp.body`
pub struct HmacSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner").field("key", &"<redacted>").finish()
    }
}

impl HmacSigner {
    /// New signer from a `whsec_`-prefixed secret.
    ///
    /// The part after the prefix is base64 and decodes to the HMAC key; secrets
    /// without the prefix are used as raw key bytes.
    pub fn new(secret: &str) -> Result<Self, SignatureError> {
        let key = match secret.strip_prefix(SECRET_PREFIX) {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map_err(|e| SignatureError::InvalidSecret(e.to_string()))?,
            None => secret.as_bytes().to_vec(),
        };

        if key.is_empty() {
            return Err(SignatureError::InvalidSecret("secret is empty".to_string()));
        }

        Ok(Self { key })
    }

    /// Sign a body, producing the versioned header value (`v1,<base64>`)
    pub fn sign(&self, message_id: &str, timestamp: OffsetDateTime, body: &str) -> String {
        let digest = self.mac(message_id, timestamp.unix_timestamp(), body).finalize();
        format_signature_header(&STANDARD.encode(digest.into_bytes()))
    }

    /// Verify a `webhook-signature` header against the current clock
    pub fn verify(
        &self,
        message_id: &str,
        timestamp: OffsetDateTime,
        body: &str,
        header: &str,
        max_age_secs: i64,
    ) -> Result<(), SignatureError> {
        self.verify_at(
            message_id,
            timestamp,
            body,
            header,
            max_age_secs,
            OffsetDateTime::now_utc(),
        )
    }

    /// Verify a `webhook-signature` header as if the clock read `now`
    pub fn verify_at(
        &self,
        message_id: &str,
        timestamp: OffsetDateTime,
        body: &str,
        header: &str,
        max_age_secs: i64,
        now: OffsetDateTime,
    ) -> Result<(), SignatureError> {
        // Check timestamp freshness first (prevent replay attacks)
        let age = now.unix_timestamp() - timestamp.unix_timestamp();
        if age > max_age_secs {
            return Err(SignatureError::TimestampTooOld {
                age,
                max_age: max_age_secs,
            });
        }
        if -age > MAX_FUTURE_SKEW_SECS {
            return Err(SignatureError::TimestampInFuture(-age));
        }

        let candidates = parse_signature_header(header)?;
        let unix = timestamp.unix_timestamp();

        for candidate in candidates {
            let Ok(expected) = STANDARD.decode(candidate) else {
                continue;
            };
            // verify_slice compares in constant time
            if self.mac(message_id, unix, body).verify_slice(&expected).is_ok() {
                return Ok(());
            }
        }

        Err(SignatureError::NoMatchingSignature)
    }

    fn mac(&self, message_id: &str, unix_timestamp: i64, body: &str) -> HmacSha256 {
        let mut mac = match HmacSha256::new_from_slice(&self.key) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC key can be of any size, as per crate documentation"),
        };
        mac.update(format!("{message_id}.{unix_timestamp}.").as_bytes());
        mac.update(body.as_bytes());
        mac
    }
}

/// Helper function to format a signature for the HTTP header
pub fn format_signature_header(signature: &str) -> String {
    format!("{SIGNATURE_VERSION},{signature}")
}

/// Extract the `v1` signatures from a space-separated header value.
///
/// Entries with other versions are skipped; a header with no `v1` entry is malformed.
pub fn parse_signature_header(header: &str) -> Result<Vec<&str>, SignatureError> {
    let signatures: Vec<&str> = header
        .split_whitespace()
        .filter_map(|entry| entry.split_once(','))
        .filter(|(version, _)| *version == SIGNATURE_VERSION)
        .map(|(_, sig)| sig)
        .collect();

    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader(header.to_string()));
    }
    Ok(signatures)
}
