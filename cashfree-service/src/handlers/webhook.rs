use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use service_core::error::AppError;

use crate::dtos::WebhookAck;
use crate::startup::AppState;
use crate::webhook::{SIGNATURE_HEADER, TIMESTAMP_HEADER};

/// Cashfree webhook endpoint.
///
/// The raw body is taken as bytes so the signature is checked over exactly
/// what was sent.
pub async fn cashfree_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let receipt = state
        .webhooks
        .handle(
            header_value(&headers, SIGNATURE_HEADER),
            header_value(&headers, TIMESTAMP_HEADER),
            &body,
        )
        .await?;

    tracing::debug!(
        event_type = %receipt.event_type,
        audit = receipt.audit.label(),
        projection = receipt.projection.label(),
        "Webhook processed"
    );

    Ok(Json(WebhookAck { status: "success" }))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
