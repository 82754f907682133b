// Webhook delivery pipeline
//
// Building blocks:
//   hmac_signer, http_client, retry_strategy, schemas
//
// Pipeline stages:
//   dispatcher      – fans an event out to one queued job per matching subscription
//   delivery_worker – drains the queue, signs and sends each job, records the outcome

pub mod delivery_worker;
pub mod dispatcher;
pub mod hmac_signer;
pub mod http_client;
pub mod retry_strategy;
pub mod schemas;

// Re-export commonly used types
pub use delivery_worker::{BatchReport, DeliveryWorker, ItemOutcome, ItemReport, WorkerConfig};
pub use dispatcher::{DispatchResult, Dispatcher};
pub use hmac_signer::{HmacSigner, SignatureError, format_signature_header, parse_signature_header};
pub use http_client::{DeliveryResponse, HttpClientError, WebhookHttpClient};
pub use retry_strategy::RetryStrategy;
pub use schemas::{SignedMessage, WebhookPayload, new_message_id};
