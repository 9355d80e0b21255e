//! Webhook endpoint handlers.
//!
//! Every handler is scoped to the calling tenant; endpoints owned by another
//! tenant are reported as not found.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use domain::models::{
    CreateWebhookEndpointRequest, CreatedWebhookEndpointResponse, ListWebhookEndpointsResponse,
    QueuedDeliveryResponse, RotateSecretResponse, UpdateWebhookEndpointRequest,
    WebhookEndpointResponse,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::OwnerId;

/// Create a webhook endpoint.
///
/// POST /api/v1/webhooks
///
/// The response is the only one besides rotation that includes the secret.
pub async fn create_webhook(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Json(request): Json<CreateWebhookEndpointRequest>,
) -> Result<(StatusCode, Json<CreatedWebhookEndpointResponse>), ApiError> {
    let endpoint = state.registry.create(owner_id, request).await?;
    Ok((StatusCode::CREATED, Json(endpoint.into())))
}

/// List the caller's webhook endpoints, newest first.
///
/// GET /api/v1/webhooks
pub async fn list_webhooks(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> Result<Json<ListWebhookEndpointsResponse>, ApiError> {
    let webhooks: Vec<WebhookEndpointResponse> = state
        .registry
        .list(owner_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(ListWebhookEndpointsResponse {
        total: webhooks.len() as i64,
        webhooks,
    }))
}

/// GET /api/v1/webhooks/:id
pub async fn get_webhook(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<Uuid>,
) -> Result<Json<WebhookEndpointResponse>, ApiError> {
    let endpoint = state.registry.get(owner_id, id).await?;
    Ok(Json(endpoint.into()))
}

/// Partially update a webhook endpoint.
///
/// PUT /api/v1/webhooks/:id
pub async fn update_webhook(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateWebhookEndpointRequest>,
) -> Result<Json<WebhookEndpointResponse>, ApiError> {
    let endpoint = state.registry.update(owner_id, id, request).await?;
    Ok(Json(endpoint.into()))
}

/// DELETE /api/v1/webhooks/:id
pub async fn delete_webhook(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.registry.delete(owner_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/webhooks/:id/rotate-secret
pub async fn rotate_secret(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<Uuid>,
) -> Result<Json<RotateSecretResponse>, ApiError> {
    let rotated = state.registry.rotate_secret(owner_id, id).await?;
    Ok(Json(rotated))
}

/// Queue a `webhook.test` delivery for the endpoint.
///
/// POST /api/v1/webhooks/:id/test
pub async fn send_test(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<QueuedDeliveryResponse>), ApiError> {
    let delivery = state.registry.send_test(owner_id, id).await?;
    Ok((StatusCode::ACCEPTED, Json((&delivery).into())))
}
