pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod outbound;
pub mod pipeline;
pub mod secrets;
pub mod server;
pub mod subscriptions;
pub mod telemetry;

pub use error::WebhookError;
pub use pipeline::Pipeline;
