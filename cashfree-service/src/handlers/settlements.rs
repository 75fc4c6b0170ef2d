//! Split settlement handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{SplitConfig, SplitSettlementRequest, SplitSettlementResponse};
use crate::models::{status, Payment, Settlement, SplitSettlement, SplitType};
use crate::services::cashfree::{CreateSettlementRequest, SettlementSplit};
use crate::startup::AppState;

/// Resolve one requested split against the payment it divides.
///
/// Exactly one of `amount` or `percentage` must be set. Percentage splits
/// are stored as their share of the payment amount.
pub fn resolve_split(
    payment: &Payment,
    split: &SplitConfig,
) -> Result<(SplitType, Decimal), AppError> {
    match (split.amount, split.percentage) {
        (Some(amount), None) => Ok((SplitType::Amount, amount)),
        (None, Some(percentage)) => Ok((
            SplitType::Percentage,
            payment.amount * percentage / Decimal::ONE_HUNDRED,
        )),
        _ => Err(AppError::BadRequest(anyhow::anyhow!(
            "split for vendor {} must set exactly one of amount or percentage",
            split.vendor_id
        ))),
    }
}

#[tracing::instrument(skip(state, request))]
pub async fn create_split_settlement(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(request): Json<SplitSettlementRequest>,
) -> Result<Json<SplitSettlementResponse>, AppError> {
    request.validate()?;

    let payment = state
        .store
        .get_payment_by_order_id(&order_id)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    let now = Utc::now();
    let mut outbound = Vec::with_capacity(request.splits.len());
    let mut rows = Vec::with_capacity(request.splits.len());

    for split in &request.splits {
        let (split_type, amount) = resolve_split(&payment, split)?;

        outbound.push(SettlementSplit {
            vendor_id: split.vendor_id.clone(),
            amount: split.amount,
            percentage: split.percentage,
        });
        rows.push(SplitSettlement {
            id: Uuid::new_v4(),
            order_id: order_id.clone(),
            cf_order_id: payment.cf_order_id.clone(),
            vendor_id: split.vendor_id.clone(),
            amount,
            percentage: split.percentage,
            split_type: split_type.as_str().to_string(),
            status: status::PENDING.to_string(),
            created_at: now,
            updated_at: now,
        });
    }

    let response = state
        .cashfree
        .create_settlement(&order_id, &CreateSettlementRequest { splits: outbound })
        .await?;

    if let Err(e) = state.store.create_split_settlements(&rows).await {
        tracing::error!(error = %e, "Failed to save split settlements");
    }

    let settlement_id = if response.settlement_id.is_empty() {
        response.cf_settlement_id.clone()
    } else {
        response.settlement_id.clone()
    };
    let settlement_status = if response.settlement_status.is_empty() {
        status::PENDING.to_string()
    } else {
        response.settlement_status.clone()
    };

    if !settlement_id.is_empty() {
        let settlement = Settlement {
            id: Uuid::new_v4(),
            settlement_id: settlement_id.clone(),
            order_id: order_id.clone(),
            cf_order_id: payment.cf_order_id.clone(),
            amount: rows.iter().map(|row| row.amount).sum(),
            status: settlement_status.clone(),
            utr: None,
            settled_at: None,
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = state.store.create_settlement(&settlement).await {
            tracing::error!(settlement_id = %settlement_id, error = %e, "Failed to save settlement");
        }
    }

    Ok(Json(SplitSettlementResponse {
        cf_settlement_id: response.cf_settlement_id,
        settlement_id,
        order_id: response.order_id.unwrap_or(order_id),
        settlement_status,
        splits: response.splits,
    }))
}

#[tracing::instrument(skip(state))]
pub async fn get_settlement(
    State(state): State<AppState>,
    Path(settlement_id): Path<String>,
) -> Result<Json<Settlement>, AppError> {
    let settlement = state
        .store
        .get_settlement_by_id(&settlement_id)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Settlement not found")))?;

    Ok(Json(settlement))
}
