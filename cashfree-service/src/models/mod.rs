//! Persisted records for cashfree-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Status strings written by this service. Anything else stored in a
/// `status` column was copied verbatim from Cashfree.
pub mod status {
    pub const CREATED: &str = "CREATED";
    pub const PAID: &str = "PAID";
    pub const SUCCESS: &str = "SUCCESS";
    pub const FAILED: &str = "FAILED";
    pub const CANCELLED: &str = "CANCELLED";
    pub const PENDING: &str = "PENDING";
    pub const WEBHOOK_RECEIVED: &str = "RECEIVED";
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: String,
    pub cf_order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cf_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields overwritten on a payment row when its status changes.
///
/// `None` clears the column, it does not preserve the previous value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentStatusUpdate {
    pub status: String,
    pub cf_payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub payment_time: Option<DateTime<Utc>>,
}

impl PaymentStatusUpdate {
    /// Status change that clears all gateway payment details.
    pub fn status_only(status: &str) -> Self {
        Self {
            status: status.to_string(),
            ..Default::default()
        }
    }

    /// Status change that keeps the payment details already on `payment`.
    pub fn keeping_details(payment: &Payment, status: &str) -> Self {
        Self {
            status: status.to_string(),
            cf_payment_id: payment.cf_payment_id.clone(),
            payment_method: payment.payment_method.clone(),
            payment_time: payment.payment_time,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Refund {
    pub id: Uuid,
    pub refund_id: String,
    pub cf_refund_id: String,
    pub order_id: String,
    pub cf_order_id: String,
    pub amount: Decimal,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Refund projection from a webhook.
///
/// A missing `status` leaves the stored status untouched; `processed_at` is
/// always written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefundStatusUpdate {
    pub status: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Settlement {
    pub id: Uuid,
    pub settlement_id: String,
    pub order_id: String,
    pub cf_order_id: String,
    pub amount: Decimal,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SplitType {
    Amount,
    Percentage,
}

impl SplitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amount => "AMOUNT",
            Self::Percentage => "PERCENTAGE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct SplitSettlement {
    pub id: Uuid,
    pub order_id: String,
    pub cf_order_id: String,
    pub vendor_id: String,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Decimal>,
    pub split_type: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit record of an authenticated webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct WebhookLog {
    pub id: Uuid,
    pub event_type: String,
    pub order_id: Option<String>,
    pub payload: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl WebhookLog {
    pub fn received(event_type: &str, order_id: Option<String>, payload: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            order_id,
            payload,
            status: status::WEBHOOK_RECEIVED.to_string(),
            created_at: Utc::now(),
        }
    }
}
