mod handlers;
mod responses;

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::infrastructure::InMemoryDeliveryQueue;
use crate::outbound::webhook::Dispatcher;
use crate::pipeline::Pipeline;
use crate::server::handlers::deliveries::{get_event, list_dead_letters, list_events};
use crate::server::handlers::events::dispatch_event;
use crate::server::handlers::health::health_check;
use crate::server::handlers::webhooks::{
    create_webhook, delete_webhook, get_webhook, list_webhooks, reveal_secret, rotate_secret,
    update_webhook,
};
use crate::subscriptions::SubscriptionService;
use axum::http::Method;
use axum::{
    Router,
    routing::{get, post},
};
use color_eyre::eyre::{Context, Result};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use webhook_audit::AuditLog;

pub use handlers::{ACTOR_HEADER, TENANT_HEADER};
pub use responses::{ApiError, ApiResult};

#[derive(Clone)]
/// The global application state shared between all request handlers.
pub struct AppState {
    subscriptions: SubscriptionService,
    dispatcher: Arc<Dispatcher>,
    audit: AuditLog,
    queue: Arc<InMemoryDeliveryQueue>,
}

impl From<&Pipeline> for AppState {
    fn from(pipeline: &Pipeline) -> Self {
        Self {
            subscriptions: pipeline.subscriptions.clone(),
            dispatcher: pipeline.dispatcher.clone(),
            audit: pipeline.audit.clone(),
            queue: pipeline.queue.clone(),
        }
    }
}

pub struct Server {
    router: Router,
    listener: TcpListener,
}

impl Server {
    /// Creates a new HTTP server over the given pipeline.
    pub async fn new(config: &Config, pipeline: &Pipeline) -> Result<Self> {
        let trace_layer =
            TraceLayer::new_for_http().make_span_with(|request: &'_ axum::extract::Request<_>| {
                let uri = request.uri().to_string();
                tracing::info_span!("request", method = %request.method(), uri)
            });

        let cors_layer = CorsLayer::new()
            .allow_origin(Any)
            .allow_headers(Any)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ]);

        let router = Self::routes()
            .layer(cors_layer)
            .layer(trace_layer)
            .with_state(AppState::from(pipeline));

        let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
            .await
            .wrap_err_with(|| format!("Failed to bind to port {}", config.server.port))?;

        Ok(Self { router, listener })
    }

    fn routes() -> Router<AppState> {
        Router::new()
            .route("/health", get(health_check))
            .route("/events", post(dispatch_event))
            .route("/webhooks", post(create_webhook).get(list_webhooks))
            .route(
                "/webhooks/{webhook_id}",
                get(get_webhook).patch(update_webhook).delete(delete_webhook),
            )
            .route("/webhooks/{webhook_id}/secret", get(reveal_secret))
            .route("/webhooks/{webhook_id}/secret/rotate", post(rotate_secret))
            .route("/webhooks/{webhook_id}/events", get(list_events))
            .route("/webhooks/{webhook_id}/events/{event_id}", get(get_event))
            .route("/dead-letters", get(list_dead_letters))
    }

    pub fn port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Runs the HTTP server.
    pub async fn run(self) -> Result<()> {
        tracing::info!("Server listening on {}", self.listener.local_addr()?);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    /// Runs the HTTP server until `signal` resolves, then drains open connections.
    pub async fn run_until<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Server listening on {}", self.listener.local_addr()?);
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(signal)
            .await?;
        Ok(())
    }
}
