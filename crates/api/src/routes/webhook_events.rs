//! Webhook event vocabulary handler.

use axum::Json;

use domain::models::ListEventTypesResponse;

/// List the events endpoints can subscribe to.
///
/// GET /api/v1/webhook-events
pub async fn list_event_types() -> Json<ListEventTypesResponse> {
    Json(ListEventTypesResponse::subscribable())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_event_types_excludes_test_event() {
        let Json(response) = list_event_types().await;
        assert_eq!(response.events.len(), 12);
        assert!(response.events.iter().all(|e| e.name != "webhook.test"));
        assert!(response.events.iter().any(|e| e.name == "invoice.paid"));
    }
}
