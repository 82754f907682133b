use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use super::{Actor, Tenant};
use crate::domain::subscription::{NewSubscription, Subscription, SubscriptionUpdate};
use crate::secrets::RotatedSecret;
use crate::server::AppState;
use crate::server::responses::ApiResult;
use crate::subscriptions::{CreatedSubscription, RevealedSecret};

pub async fn create_webhook(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Actor(actor): Actor,
    Json(input): Json<NewSubscription>,
) -> ApiResult<(StatusCode, Json<CreatedSubscription>)> {
    let created = state
        .subscriptions
        .create(&tenant_id, input.created_by(actor))
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_webhooks(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
) -> ApiResult<Json<Vec<Subscription>>> {
    Ok(Json(state.subscriptions.list(&tenant_id).await?))
}

pub async fn get_webhook(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Path(webhook_id): Path<String>,
) -> ApiResult<Json<Subscription>> {
    Ok(Json(state.subscriptions.get(&tenant_id, &webhook_id).await?))
}

pub async fn update_webhook(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Actor(actor): Actor,
    Path(webhook_id): Path<String>,
    Json(update): Json<SubscriptionUpdate>,
) -> ApiResult<Json<Subscription>> {
    let updated = state
        .subscriptions
        .update(&tenant_id, &webhook_id, update, &actor)
        .await?;
    Ok(Json(updated))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Path(webhook_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.subscriptions.delete(&tenant_id, &webhook_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn rotate_secret(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Actor(actor): Actor,
    Path(webhook_id): Path<String>,
) -> ApiResult<Json<RotatedSecret>> {
    let rotated = state
        .subscriptions
        .rotate_secret(&tenant_id, &webhook_id, &actor)
        .await?;
    Ok(Json(rotated))
}

pub async fn reveal_secret(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Path(webhook_id): Path<String>,
) -> ApiResult<Json<RevealedSecret>> {
    let revealed = state
        .subscriptions
        .reveal_secret(&tenant_id, &webhook_id)
        .await?;
    Ok(Json(revealed))
}
