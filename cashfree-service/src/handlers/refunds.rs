//! Refund creation and lookup handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{RefundRequest, RefundResponse};
use crate::models::Refund;
use crate::services::cashfree::CreateRefundRequest;
use crate::startup::AppState;

/// `refund_{order_id}_{unix_seconds}`.
pub fn refund_id_for(order_id: &str) -> String {
    format!("refund_{}_{}", order_id, Utc::now().timestamp())
}

/// Refund part or all of a stored payment through Cashfree.
#[tracing::instrument(skip(state, request))]
pub async fn create_refund(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(request): Json<RefundRequest>,
) -> Result<Json<RefundResponse>, AppError> {
    request.validate()?;

    let payment = state
        .store
        .get_payment_by_order_id(&order_id)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    let refund_id = refund_id_for(&order_id);

    let response = state
        .cashfree
        .create_refund(
            &order_id,
            &CreateRefundRequest {
                refund_amount: request.amount,
                refund_id: refund_id.clone(),
                refund_note: request.reason.clone(),
            },
        )
        .await?;

    let now = Utc::now();
    let refund = Refund {
        id: Uuid::new_v4(),
        refund_id,
        cf_refund_id: response.cf_refund_id.clone(),
        order_id: order_id.clone(),
        cf_order_id: payment.cf_order_id,
        amount: request.amount,
        status: response.refund_status.clone(),
        reason: request.reason,
        processed_at: None,
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = state.store.create_refund(&refund).await {
        tracing::error!(refund_id = %refund.refund_id, error = %e, "Failed to save refund");
    }

    Ok(Json(RefundResponse {
        refund_id: response.refund_id,
        cf_refund_id: response.cf_refund_id,
        order_id: response.order_id.unwrap_or(order_id),
        refund_amount: response.refund_amount.unwrap_or(refund.amount),
        refund_status: response.refund_status,
    }))
}

#[tracing::instrument(skip(state))]
pub async fn get_refund(
    State(state): State<AppState>,
    Path(refund_id): Path<String>,
) -> Result<Json<Refund>, AppError> {
    let refund = state
        .store
        .get_refund_by_id(&refund_id)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Refund not found")))?;

    Ok(Json(refund))
}
