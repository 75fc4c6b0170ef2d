//! Payment session, verification, lookup and cancellation handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, SecondsFormat, Utc};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    CancelPaymentResponse, CreatePaymentSessionRequest, CreatePaymentSessionResponse,
    ListPaymentsQuery, ListPaymentsResponse, VerifyPaymentRequest, VerifyPaymentResponse,
};
use crate::models::{status, Payment, PaymentStatusUpdate};
use crate::services::cashfree::{CreateOrderRequest, CustomerDetails, OrderMeta};
use crate::startup::AppState;

const ORDER_EXPIRY_HOURS: i64 = 24;

/// Create a Cashfree order and store it as a `CREATED` payment.
#[tracing::instrument(skip(state, request), fields(order_id = %request.order_id))]
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentSessionRequest>,
) -> Result<Json<CreatePaymentSessionResponse>, AppError> {
    request.validate()?;

    let order_meta = (request.return_url.is_some() || request.notify_url.is_some()).then(|| {
        OrderMeta {
            return_url: request.return_url.clone(),
            notify_url: request.notify_url.clone(),
        }
    });

    let expiry = (Utc::now() + Duration::hours(ORDER_EXPIRY_HOURS))
        .to_rfc3339_opts(SecondsFormat::Secs, true);

    let order = state
        .cashfree
        .create_order(&CreateOrderRequest {
            order_id: request.order_id.clone(),
            order_amount: request.amount,
            order_currency: request.currency.clone(),
            customer_details: CustomerDetails {
                customer_id: request.customer_id.clone(),
                customer_name: request.customer_name.clone(),
                customer_email: request.customer_email.clone(),
                customer_phone: request.customer_phone.clone(),
            },
            order_meta,
            order_note: request.description.clone(),
            order_expiry_time: Some(expiry),
        })
        .await?;

    let now = Utc::now();
    let payment = Payment {
        id: Uuid::new_v4(),
        order_id: request.order_id.clone(),
        cf_order_id: order.cf_order_id.clone(),
        amount: request.amount,
        currency: request.currency.clone(),
        status: status::CREATED.to_string(),
        payment_method: None,
        customer_id: request.customer_id,
        customer_name: request.customer_name,
        customer_email: request.customer_email,
        customer_phone: request.customer_phone,
        description: request.description,
        payment_url: order.payment_link.clone(),
        cf_payment_id: None,
        payment_time: None,
        created_at: now,
        updated_at: now,
    };

    state.store.create_payment(&payment).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to save payment");
        AppError::DatabaseError(e)
    })?;

    tracing::info!(cf_order_id = %order.cf_order_id, "Payment session created");

    Ok(Json(CreatePaymentSessionResponse {
        order_id: order.order_id,
        cf_order_id: order.cf_order_id,
        payment_link: order.payment_link,
        payment_session_id: order.payment_session_id,
        order_status: order.order_status,
        amount: payment.amount,
        currency: payment.currency,
    }))
}

/// Ask Cashfree for the order's status and record it locally.
#[tracing::instrument(skip(state, request), fields(order_id = %request.order_id))]
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    request.validate()?;

    let order = state.cashfree.get_order(&request.order_id).await?;

    let payment = if order.order_status == status::PAID {
        Some(state.cashfree.get_payments(&request.order_id).await?)
    } else {
        None
    };

    let update = match &payment {
        Some(details) => PaymentStatusUpdate {
            status: order.order_status.clone(),
            cf_payment_id: Some(details.cf_payment_id.clone()),
            payment_method: details.payment_method.clone(),
            payment_time: details.payment_time,
        },
        None => PaymentStatusUpdate::status_only(&order.order_status),
    };

    if let Err(e) = state
        .store
        .update_payment_status(&request.order_id, &update)
        .await
    {
        tracing::error!(error = %e, "Failed to update payment status");
    }

    tracing::info!(order_status = %order.order_status, "Payment verified");

    Ok(Json(VerifyPaymentResponse {
        order_id: order.order_id,
        cf_order_id: order.cf_order_id,
        order_status: order.order_status,
        order_amount: order.order_amount,
        cf_payment_id: payment.as_ref().map(|p| p.cf_payment_id.clone()),
        payment_method: payment.as_ref().and_then(|p| p.payment_method.clone()),
        payment_time: payment.as_ref().and_then(|p| p.payment_time),
        payment_amount: payment.as_ref().and_then(|p| p.payment_amount),
    }))
}

/// Stored payment, refreshed from Cashfree when it is reachable.
#[tracing::instrument(skip(state))]
pub async fn get_payment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Payment>, AppError> {
    let mut payment = state
        .store
        .get_payment_by_order_id(&order_id)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    let order = match state.cashfree.get_order(&order_id).await {
        Ok(order) => order,
        Err(e) => {
            tracing::warn!(error = %e, "Cashfree unavailable, returning stored payment");
            return Ok(Json(payment));
        }
    };

    if payment.status != order.order_status {
        let update = PaymentStatusUpdate::keeping_details(&payment, &order.order_status);
        if let Err(e) = state.store.update_payment_status(&order_id, &update).await {
            tracing::error!(error = %e, "Failed to update payment status");
        }
        payment.status = order.order_status;
    }

    Ok(Json(payment))
}

#[tracing::instrument(skip(state))]
pub async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<ListPaymentsResponse>, AppError> {
    let limit = query.limit();
    let offset = query.offset();

    let payments = state
        .store
        .list_payments(limit, offset)
        .await
        .map_err(AppError::DatabaseError)?;

    Ok(Json(ListPaymentsResponse {
        count: payments.len(),
        payments,
        limit,
        offset,
    }))
}

#[tracing::instrument(skip(state))]
pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<CancelPaymentResponse>, AppError> {
    state.cashfree.cancel_order(&order_id).await?;

    if let Err(e) = state
        .store
        .update_payment_status(&order_id, &PaymentStatusUpdate::status_only(status::CANCELLED))
        .await
    {
        tracing::error!(error = %e, "Failed to update payment status");
    }

    Ok(Json(CancelPaymentResponse {
        order_id,
        status: status::CANCELLED.to_string(),
        message: "Payment cancelled successfully".to_string(),
    }))
}
