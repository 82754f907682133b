use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::Tenant;
use crate::outbound::webhook::DispatchResult;
use crate::server::AppState;
use crate::server::responses::ApiResult;

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchRequest {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// Fan an event out to the tenant's matching subscriptions
pub async fn dispatch_event(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Json(request): Json<DispatchRequest>,
) -> ApiResult<(StatusCode, Json<DispatchResult>)> {
    let result = state
        .dispatcher
        .dispatch(&tenant_id, &request.event_type, request.data)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(result)))
}
