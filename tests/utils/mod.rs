#![allow(dead_code)]

use std::time::Duration;

use reqwest::{Client, Response};
use serde_json::Value;
use tenant_webhooks::{config::Config, pipeline::Pipeline, server::Server};
use tokio::sync::watch;

pub const TENANT: &str = "tenant-1";

pub struct TestApp {
    pub addr: String,
    pub pipeline: Pipeline,
    pub client: Client,
    _shutdown: watch::Sender<bool>,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

/// Start the server and a delivery worker pool on a random port
pub async fn spawn_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let config = {
        let mut config = Config::load().unwrap();
        config.server.host = "localhost".to_string();
        config.server.port = 0;
        config.delivery.poll_interval_ms = 20;
        config.delivery.request_timeout_secs = 5;
        configure(&mut config);
        config
    };

    let pipeline = Pipeline::from_config(&config).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    pipeline.worker.clone().spawn(shutdown_rx);

    let server = Server::new(&config, &pipeline).await.unwrap();
    let port = server.port().unwrap();
    tokio::spawn(server.run());

    TestApp {
        addr: format!("http://{}:{}", config.server.host, port),
        pipeline,
        client: Client::new(),
        _shutdown: shutdown_tx,
    }
}

impl TestApp {
    pub async fn get(&self, path: &str, tenant: &str) -> Response {
        self.client
            .get(format!("{}{path}", self.addr))
            .header("x-tenant-id", tenant)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post(&self, path: &str, tenant: &str, body: Value) -> Response {
        self.client
            .post(format!("{}{path}", self.addr))
            .header("x-tenant-id", tenant)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Register a subscription and return the creation response body
    pub async fn create_webhook(&self, tenant: &str, endpoint: &str, event_types: &[&str]) -> Value {
        let response = self
            .post(
                "/webhooks",
                tenant,
                serde_json::json!({"endpoint": endpoint, "event_types": event_types}),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.unwrap()
    }

    /// Poll the audit log until `count` events exist for the webhook
    pub async fn wait_for_events(&self, tenant: &str, webhook_id: &str, count: usize) -> Vec<Value> {
        let path = format!("/webhooks/{webhook_id}/events?limit=100");
        for _ in 0..250 {
            let page: Value = self.get(&path, tenant).await.json().await.unwrap();
            let data = page["data"].as_array().cloned().unwrap_or_default();
            if data.len() >= count {
                return data;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("timed out waiting for {count} delivery events on {webhook_id}");
    }
}
