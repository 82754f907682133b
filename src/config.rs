use std::collections::HashMap;
use std::time::Duration;

use config::{Config as ConfigLib, ConfigBuilder, ConfigError, Environment, builder::DefaultState};
use serde::{Deserialize, Serialize};

use crate::domain::ports::MAX_BATCH_SIZE;
use crate::outbound::webhook::{RetryStrategy, WorkerConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub delivery: DeliveryConfig,
    pub retry: RetryConfig,
    pub secrets: SecretsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Target queue for delivery jobs
    pub name: String,
    pub batch_size: usize,
    pub visibility_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub request_timeout_secs: u64,
    pub concurrency: usize,
    pub workers: usize,
    pub invocation_budget_secs: u64,
    pub max_response_body_bytes: usize,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    pub max_attempts: u32,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    pub kms_key_id: String,

    /// Base64 of a 32-byte key; an ephemeral key is generated when absent
    #[serde(default)]
    pub master_key: Option<String>,

    pub allow_reveal: bool,
}

impl std::fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsConfig")
            .field("kms_key_id", &self.kms_key_id)
            .field("master_key", &self.master_key.as_ref().map(|_| "<redacted>"))
            .field("allow_reveal", &self.allow_reveal)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub format: LogFormat,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    fn load_with_sources(env_vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults()?;
        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Use system environment variables
            // Should be in the format APP_SERVER__PORT or APP_QUEUE__NAME
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        builder.build()?.try_deserialize()
    }

    /// Set default values for the configuration.
    /// This is used when no environment variables or config file are provided
    fn set_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        ConfigLib::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("queue.name", "webhook-deliveries")?
            .set_default("queue.batch_size", MAX_BATCH_SIZE as u64)?
            .set_default("queue.visibility_timeout_secs", 60)?
            .set_default("delivery.request_timeout_secs", 10)?
            .set_default("delivery.concurrency", 10)?
            .set_default("delivery.workers", 2)?
            .set_default("delivery.invocation_budget_secs", 55)?
            .set_default("delivery.max_response_body_bytes", 4096)?
            .set_default("delivery.poll_interval_ms", 250)?
            .set_default("retry.base_delay_secs", 2)?
            .set_default("retry.max_delay_secs", 300)?
            .set_default("retry.max_attempts", 5)?
            .set_default("secrets.kms_key_id", "local-default")?
            .set_default("secrets.allow_reveal", false)?
            .set_default("log.format", "pretty")
    }

    pub fn retry_strategy(&self) -> RetryStrategy {
        RetryStrategy::new(
            self.retry.max_attempts,
            Duration::from_secs(self.retry.base_delay_secs),
        )
        .with_max_delay(Duration::from_secs(self.retry.max_delay_secs))
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            batch_size: self.queue.batch_size.clamp(1, MAX_BATCH_SIZE),
            concurrency: self.delivery.concurrency,
            invocation_budget: Duration::from_secs(self.delivery.invocation_budget_secs),
            poll_interval: Duration::from_millis(self.delivery.poll_interval_ms),
            workers: self.delivery.workers,
        }
    }
}
