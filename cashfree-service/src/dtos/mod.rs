use crate::models::Payment;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

fn positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(ValidationError::new("positive").with_message("must be greater than zero".into()))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentSessionRequest {
    #[validate(length(min = 1, message = "order_id is required"))]
    pub order_id: String,
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    #[validate(length(min = 1, message = "currency is required"))]
    pub currency: String,
    #[validate(length(min = 1, message = "customer_id is required"))]
    pub customer_id: String,
    #[validate(length(min = 1, message = "customer_name is required"))]
    pub customer_name: String,
    #[validate(email(message = "Invalid customer email address"))]
    pub customer_email: String,
    #[validate(length(min = 1, message = "customer_phone is required"))]
    pub customer_phone: String,
    pub description: Option<String>,
    #[validate(url(message = "return_url must be a valid URL"))]
    pub return_url: Option<String>,
    #[validate(url(message = "notify_url must be a valid URL"))]
    pub notify_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentSessionResponse {
    pub order_id: String,
    pub cf_order_id: String,
    pub payment_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_session_id: Option<String>,
    pub order_status: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "order_id is required"))]
    pub order_id: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub order_id: String,
    pub cf_order_id: String,
    pub order_status: String,
    pub order_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cf_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_amount: Option<Decimal>,
}

/// Raw pagination parameters. Kept as strings so bad input falls back to
/// defaults instead of failing extraction.
#[derive(Debug, Default, Deserialize)]
pub struct ListPaymentsQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

impl ListPaymentsQuery {
    /// Default 10, non-numeric or non-positive values fall back to it, capped at 100.
    pub fn limit(&self) -> i64 {
        match self.limit.as_deref().and_then(|s| s.trim().parse::<i64>().ok()) {
            Some(limit) if limit > 0 => limit.min(MAX_PAGE_LIMIT),
            _ => DEFAULT_PAGE_LIMIT,
        }
    }

    /// Default 0, non-numeric or negative values fall back to it.
    pub fn offset(&self) -> i64 {
        match self.offset.as_deref().and_then(|s| s.trim().parse::<i64>().ok()) {
            Some(offset) if offset >= 0 => offset,
            _ => 0,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListPaymentsResponse {
    pub payments: Vec<Payment>,
    pub limit: i64,
    pub offset: i64,
    pub count: usize,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefundRequest {
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub refund_id: String,
    pub cf_refund_id: String,
    pub order_id: String,
    pub refund_amount: Decimal,
    pub refund_status: String,
}

#[derive(Debug, Serialize)]
pub struct CancelPaymentResponse {
    pub order_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SplitConfig {
    #[validate(length(min = 1, message = "vendor_id is required"))]
    pub vendor_id: String,
    #[validate(custom(function = "positive_amount"))]
    pub amount: Option<Decimal>,
    #[validate(custom(function = "positive_amount"))]
    pub percentage: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SplitSettlementRequest {
    #[validate(length(min = 1, message = "at least one split is required"), nested)]
    pub splits: Vec<SplitConfig>,
}

#[derive(Debug, Serialize)]
pub struct SplitSettlementResponse {
    pub cf_settlement_id: String,
    pub settlement_id: String,
    pub order_id: String,
    pub settlement_status: String,
    pub splits: Vec<crate::services::cashfree::SettlementSplit>,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}
