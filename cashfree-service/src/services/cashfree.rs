//! Cashfree Payment Gateway client.
//!
//! Wraps the PG REST API (orders, payments, refunds, settlements) with
//! header authentication and retries for transient failures.

use crate::config::CashfreeConfig;
use crate::services::metrics::record_api_request;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, Method, RequestBuilder};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use service_core::error::AppError;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CashfreeError {
    #[error("Cashfree credentials not configured")]
    NotConfigured,

    #[error("Cashfree request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Cashfree API returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Failed to decode Cashfree response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("No payments found for order {0}")]
    NoPayments(String),
}

impl From<CashfreeError> for AppError {
    fn from(err: CashfreeError) -> Self {
        match err {
            CashfreeError::NotConfigured => AppError::ServiceUnavailable,
            CashfreeError::Upstream { status, .. } => {
                AppError::BadGateway(format!("Cashfree API returned status {}", status))
            }
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetails {
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub order_id: String,
    pub order_amount: Decimal,
    pub order_currency: String,
    pub customer_details: CustomerDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_meta: Option<OrderMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_note: Option<String>,
    /// RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_expiry_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CashfreeOrder {
    #[serde(default, deserialize_with = "string_or_number")]
    pub cf_order_id: String,
    pub order_id: String,
    pub order_status: String,
    #[serde(default)]
    pub order_amount: Option<Decimal>,
    #[serde(default)]
    pub order_currency: Option<String>,
    #[serde(default)]
    pub payment_link: Option<String>,
    #[serde(default)]
    pub payment_session_id: Option<String>,
    #[serde(default)]
    pub order_expiry_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CashfreePayment {
    #[serde(default, deserialize_with = "string_or_number")]
    pub cf_payment_id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub payment_amount: Option<Decimal>,
    #[serde(default)]
    pub payment_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Either a plain name or Cashfree's `{"card": {..}}` object, reduced to its key.
    #[serde(default, deserialize_with = "method_name")]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRefundRequest {
    pub refund_amount: Decimal,
    pub refund_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CashfreeRefund {
    #[serde(default, deserialize_with = "string_or_number")]
    pub cf_refund_id: String,
    pub refund_id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub refund_amount: Option<Decimal>,
    #[serde(default)]
    pub refund_status: String,
    #[serde(default)]
    pub refund_note: Option<String>,
    #[serde(default)]
    pub processed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementSplit {
    pub vendor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSettlementRequest {
    pub splits: Vec<SettlementSplit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CashfreeSettlement {
    #[serde(default, deserialize_with = "string_or_number")]
    pub cf_settlement_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub settlement_id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub settlement_status: String,
    #[serde(default)]
    pub splits: Vec<SettlementSplit>,
}

/// Cashfree client for interacting with the PG API.
#[derive(Clone)]
pub struct CashfreeClient {
    client: Client,
    config: CashfreeConfig,
}

impl CashfreeClient {
    pub fn new(config: CashfreeConfig) -> Result<Self, CashfreeError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        self.config.api_base_url.trim_end_matches('/')
    }

    /// Check if Cashfree is configured (credentials are set).
    pub fn is_configured(&self) -> bool {
        !self.config.client_id.is_empty() && !self.config.client_secret.expose_secret().is_empty()
    }

    pub async fn create_order(&self, request: &CreateOrderRequest) -> Result<CashfreeOrder, CashfreeError> {
        let order: CashfreeOrder = self
            .execute("create_order", || {
                self.request(Method::POST, "/orders").json(request)
            })
            .await?;

        tracing::info!(
            order_id = %order.order_id,
            cf_order_id = %order.cf_order_id,
            order_status = %order.order_status,
            "Cashfree order created"
        );
        Ok(order)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<CashfreeOrder, CashfreeError> {
        let path = format!("/orders/{}", order_id);
        self.execute("get_order", || self.request(Method::GET, &path))
            .await
    }

    /// First payment attempt recorded against an order.
    pub async fn get_payments(&self, order_id: &str) -> Result<CashfreePayment, CashfreeError> {
        let path = format!("/orders/{}/payments", order_id);
        let payments: Vec<CashfreePayment> = self
            .execute("get_payments", || self.request(Method::GET, &path))
            .await?;

        payments
            .into_iter()
            .next()
            .ok_or_else(|| CashfreeError::NoPayments(order_id.to_string()))
    }

    pub async fn create_refund(
        &self,
        order_id: &str,
        request: &CreateRefundRequest,
    ) -> Result<CashfreeRefund, CashfreeError> {
        let path = format!("/orders/{}/refunds", order_id);
        let refund: CashfreeRefund = self
            .execute("create_refund", || {
                self.request(Method::POST, &path).json(request)
            })
            .await?;

        tracing::info!(
            order_id = %order_id,
            refund_id = %refund.refund_id,
            refund_status = %refund.refund_status,
            "Cashfree refund created"
        );
        Ok(refund)
    }

    pub async fn get_refund(&self, order_id: &str, refund_id: &str) -> Result<CashfreeRefund, CashfreeError> {
        let path = format!("/orders/{}/refunds/{}", order_id, refund_id);
        self.execute("get_refund", || self.request(Method::GET, &path))
            .await
    }

    pub async fn cancel_order(&self, order_id: &str) -> Result<(), CashfreeError> {
        let path = format!("/orders/{}/cancel", order_id);
        let _: IgnoredAny = self
            .execute("cancel_order", || self.request(Method::PATCH, &path))
            .await?;

        tracing::info!(order_id = %order_id, "Cashfree order cancelled");
        Ok(())
    }

    pub async fn create_settlement(
        &self,
        order_id: &str,
        request: &CreateSettlementRequest,
    ) -> Result<CashfreeSettlement, CashfreeError> {
        let path = format!("/orders/{}/settlements", order_id);
        let settlement: CashfreeSettlement = self
            .execute("create_settlement", || {
                self.request(Method::POST, &path).json(request)
            })
            .await?;

        tracing::info!(
            order_id = %order_id,
            settlement_id = %settlement.settlement_id,
            splits = settlement.splits.len(),
            "Cashfree settlement created"
        );
        Ok(settlement)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url(), path))
            .header("x-client-id", &self.config.client_id)
            .header("x-client-secret", self.config.client_secret.expose_secret())
            .header("x-api-version", &self.config.api_version)
            .header("Accept", "application/json")
    }

    /// Send a request, retrying transport errors and 5xx responses until the
    /// retry budget runs out. `build` is called once per attempt.
    async fn execute<T, F>(&self, operation: &'static str, build: F) -> Result<T, CashfreeError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        if !self.is_configured() {
            return Err(CashfreeError::NotConfigured);
        }

        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(250),
            max_elapsed_time: Some(self.config.retry_max_elapsed),
            ..Default::default()
        };

        let start = Instant::now();
        let result = retry(backoff, || {
            let request = build();
            async move { attempt::<T>(operation, request).await }
        })
        .await;

        let outcome = if result.is_ok() { "success" } else { "error" };
        record_api_request(operation, outcome, start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            tracing::error!(operation, error = %e, "Cashfree request failed");
        }
        result
    }
}

async fn attempt<T: DeserializeOwned>(
    operation: &'static str,
    request: RequestBuilder,
) -> Result<T, backoff::Error<CashfreeError>> {
    let response = request.send().await.map_err(|e| {
        tracing::warn!(operation, error = %e, "Cashfree transport error");
        backoff::Error::transient(CashfreeError::Transport(e))
    })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| backoff::Error::transient(CashfreeError::Transport(e)))?;

    tracing::debug!(operation, status = %status, "Cashfree response");

    if !status.is_success() {
        let err = CashfreeError::Upstream {
            status: status.as_u16(),
            body,
        };
        return Err(if status.is_server_error() {
            tracing::warn!(operation, status = %status, "Cashfree server error");
            backoff::Error::transient(err)
        } else {
            backoff::Error::permanent(err)
        });
    }

    let text = if body.trim().is_empty() { "null" } else { body.as_str() };
    serde_json::from_str(text).map_err(|e| backoff::Error::permanent(CashfreeError::Decode(e)))
}

/// Cashfree returns some identifiers as JSON numbers; keep them as strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn method_name<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Object(map) => map.keys().next().cloned(),
        _ => None,
    })
}
