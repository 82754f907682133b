use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use webhook_audit::{DeliveryEvent, EventPage};

use super::Tenant;
use crate::domain::job::DeliveryJob;
use crate::error::WebhookError;
use crate::infrastructure::DeadLetter;
use crate::server::AppState;
use crate::server::responses::ApiResult;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListEventsQuery {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

/// Delivery history of one subscription, oldest first
pub async fn list_events(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Path(webhook_id): Path<String>,
    Query(query): Query<ListEventsQuery>,
) -> ApiResult<Json<EventPage>> {
    // Unknown or foreign webhooks are a 404, not an empty page
    state.subscriptions.get(&tenant_id, &webhook_id).await?;

    let page = state
        .audit
        .list(&tenant_id, &webhook_id, query.limit, query.cursor.as_deref())
        .await
        .map_err(WebhookError::from)?;
    Ok(Json(page))
}

pub async fn get_event(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Path((webhook_id, event_id)): Path<(String, String)>,
) -> ApiResult<Json<DeliveryEvent>> {
    let event = state
        .audit
        .get_by_id(&tenant_id, &webhook_id, &event_id)
        .await
        .map_err(WebhookError::from)?;
    Ok(Json(event))
}

/// The tenant's jobs that exhausted their attempts
pub async fn list_dead_letters(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
) -> Json<Vec<DeadLetter>> {
    let dead_letters = state
        .queue
        .dead_letters()
        .await
        .into_iter()
        .filter(|letter| {
            DeliveryJob::parse(&letter.body)
                .map(|job| job.tenant_id == tenant_id)
                .unwrap_or(false)
        })
        .collect();
    Json(dead_letters)
}
