//! Webhook delivery history handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use domain::models::{
    DeliveryStats, ListDeliveriesQuery, ListDeliveriesResponse, QueuedDeliveryResponse,
    WebhookDeliveryResponse,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::OwnerId;

/// List deliveries of one endpoint, newest first.
///
/// GET /api/v1/webhooks/:id/deliveries?status=failed&limit=20&offset=0
pub async fn list_deliveries(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(endpoint_id): Path<Uuid>,
    Query(query): Query<ListDeliveriesQuery>,
) -> Result<Json<ListDeliveriesResponse>, ApiError> {
    let page = state
        .audit
        .list_deliveries(owner_id, endpoint_id, &query)
        .await?;

    Ok(Json(ListDeliveriesResponse {
        deliveries: page.deliveries.into_iter().map(Into::into).collect(),
        total: page.total,
        limit: query.limit(),
        offset: query.offset(),
    }))
}

/// GET /api/v1/webhooks/:id/deliveries/stats
pub async fn delivery_stats(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(endpoint_id): Path<Uuid>,
) -> Result<Json<DeliveryStats>, ApiError> {
    Ok(Json(state.audit.stats(owner_id, endpoint_id).await?))
}

/// GET /api/v1/webhook-deliveries/:id
pub async fn get_delivery(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(delivery_id): Path<Uuid>,
) -> Result<Json<WebhookDeliveryResponse>, ApiError> {
    let delivery = state.audit.get_delivery(owner_id, delivery_id).await?;
    Ok(Json(delivery.into()))
}

/// Queue a fresh copy of a delivered or permanently failed delivery.
///
/// POST /api/v1/webhook-deliveries/:id/redeliver
pub async fn redeliver(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(delivery_id): Path<Uuid>,
) -> Result<(StatusCode, Json<QueuedDeliveryResponse>), ApiError> {
    let delivery = state.registry.redeliver(owner_id, delivery_id).await?;
    Ok((StatusCode::ACCEPTED, Json((&delivery).into())))
}
