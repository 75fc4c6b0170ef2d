use crate::models::{status, PaymentStatusUpdate, RefundStatusUpdate, WebhookLog};
use crate::services::metrics::{record_webhook_event, record_webhook_rejection};
use crate::services::repository::PaymentStore;
use crate::webhook::event::{ParsedWebhook, WebhookEvent};
use crate::webhook::signature;
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Why a delivery was refused. Nothing is written for a rejected delivery.
#[derive(Debug, Error)]
pub enum WebhookRejection {
    #[error("Missing webhook headers")]
    MissingHeaders,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid webhook data: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

impl WebhookRejection {
    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingHeaders => "missing_headers",
            Self::InvalidSignature => "invalid_signature",
            Self::MalformedPayload(_) => "malformed_payload",
        }
    }
}

impl From<WebhookRejection> for AppError {
    fn from(rejection: WebhookRejection) -> Self {
        match rejection {
            WebhookRejection::InvalidSignature => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid signature"))
            }
            WebhookRejection::MissingHeaders => {
                AppError::BadRequest(anyhow::anyhow!("Missing webhook headers"))
            }
            WebhookRejection::MalformedPayload(_) => {
                AppError::BadRequest(anyhow::anyhow!("Invalid webhook data"))
            }
        }
    }
}

/// Outcome of one best-effort store write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    Applied,
    Skipped { reason: String },
    Failed { reason: String },
}

impl SideEffect {
    fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// What happened to an accepted delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookReceipt {
    pub event_type: String,
    pub order_id: Option<String>,
    pub audit: SideEffect,
    pub projection: SideEffect,
}

/// Authenticates Cashfree deliveries and projects them onto stored records.
#[derive(Clone)]
pub struct WebhookProcessor {
    store: Arc<dyn PaymentStore>,
    secret: Secret<String>,
    store_timeout: Duration,
}

impl WebhookProcessor {
    pub fn new(store: Arc<dyn PaymentStore>, secret: Secret<String>, store_timeout: Duration) -> Self {
        Self {
            store,
            secret,
            store_timeout,
        }
    }

    /// Verify, audit and project one delivery.
    ///
    /// Once the signature and envelope are accepted this always returns
    /// `Ok`; store failures and timeouts are reported in the receipt.
    #[instrument(skip_all, fields(body_len = raw_body.len()))]
    pub async fn handle(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        raw_body: &[u8],
    ) -> Result<WebhookReceipt, WebhookRejection> {
        let result = self.authenticate(signature, timestamp, raw_body);
        let parsed = match result {
            Ok(parsed) => parsed,
            Err(rejection) => {
                warn!(reason = rejection.reason(), error = %rejection, "Webhook rejected");
                record_webhook_rejection(rejection.reason());
                return Err(rejection);
            }
        };

        info!(
            event_type = %parsed.event_type,
            order_id = parsed.order_id.as_deref().unwrap_or("-"),
            "Webhook received"
        );

        let record = WebhookLog::received(
            &parsed.event_type,
            parsed.order_id.clone(),
            String::from_utf8_lossy(raw_body).into_owned(),
        );
        let audit = match self
            .bounded("append_webhook_log", self.store.append_webhook_log(&record))
            .await
        {
            Ok(()) => SideEffect::Applied,
            Err(reason) => {
                error!(event_type = %parsed.event_type, error = %reason, "Failed to log webhook");
                SideEffect::failed(reason)
            }
        };

        let projection = self.project(&parsed).await;

        record_webhook_event(metric_event_type(&parsed.event), projection.label());

        Ok(WebhookReceipt {
            event_type: parsed.event_type,
            order_id: parsed.order_id,
            audit,
            projection,
        })
    }

    fn authenticate(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        raw_body: &[u8],
    ) -> Result<ParsedWebhook, WebhookRejection> {
        let (Some(signature), Some(timestamp)) = (non_empty(signature), non_empty(timestamp))
        else {
            return Err(WebhookRejection::MissingHeaders);
        };

        // Without a key nothing authenticates.
        let secret = self.secret.expose_secret();
        if secret.is_empty() || !signature::verify(signature, timestamp, raw_body, secret) {
            return Err(WebhookRejection::InvalidSignature);
        }

        Ok(ParsedWebhook::parse(raw_body)?)
    }

    async fn project(&self, parsed: &ParsedWebhook) -> SideEffect {
        match &parsed.event {
            WebhookEvent::PaymentSuccess(data) => {
                let Some(order_id) = data.order_id.as_deref() else {
                    warn!("Missing order_id in payment success webhook");
                    return SideEffect::skipped("missing order_id");
                };
                let update = PaymentStatusUpdate {
                    status: status::SUCCESS.to_string(),
                    cf_payment_id: data.cf_payment_id.clone(),
                    payment_method: data.payment_method.clone(),
                    payment_time: data.payment_time,
                };
                self.apply_payment_update(order_id, update).await
            }
            WebhookEvent::PaymentFailed(data) => {
                let Some(order_id) = data.order_id.as_deref() else {
                    warn!("Missing order_id in payment failed webhook");
                    return SideEffect::skipped("missing order_id");
                };
                self.apply_payment_update(order_id, PaymentStatusUpdate::status_only(status::FAILED))
                    .await
            }
            WebhookEvent::RefundStatus(data) => {
                let Some(refund_id) = data.refund_id.as_deref() else {
                    warn!("Missing refund_id in refund status webhook");
                    return SideEffect::skipped("missing refund_id");
                };
                let update = RefundStatusUpdate {
                    status: data.refund_status.clone(),
                    processed_at: data.processed_at,
                };
                match self
                    .bounded(
                        "update_refund_status",
                        self.store.update_refund_status(refund_id, &update),
                    )
                    .await
                {
                    Ok(0) => {
                        warn!(refund_id = %refund_id, "Refund not found for webhook");
                        SideEffect::failed("refund not found")
                    }
                    Ok(_) => SideEffect::Applied,
                    Err(reason) => {
                        error!(refund_id = %refund_id, error = %reason, "Failed to update refund status");
                        SideEffect::failed(reason)
                    }
                }
            }
            WebhookEvent::SettlementStatus => {
                info!(order_id = parsed.order_id.as_deref().unwrap_or("-"), "Settlement webhook received");
                SideEffect::skipped("settlement events are audit-only")
            }
            WebhookEvent::Unknown => {
                warn!(event_type = %parsed.event_type, "Unknown webhook type");
                SideEffect::skipped("unknown event type")
            }
        }
    }

    async fn apply_payment_update(&self, order_id: &str, update: PaymentStatusUpdate) -> SideEffect {
        match self
            .bounded(
                "update_payment_status",
                self.store.update_payment_status(order_id, &update),
            )
            .await
        {
            Ok(0) => {
                warn!(order_id = %order_id, status = %update.status, "Payment not found for webhook");
                SideEffect::failed("payment not found")
            }
            Ok(_) => {
                info!(order_id = %order_id, status = %update.status, "Payment status updated from webhook");
                SideEffect::Applied
            }
            Err(reason) => {
                error!(order_id = %order_id, error = %reason, "Failed to update payment status");
                SideEffect::failed(reason)
            }
        }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, String> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(format!("{}: {:#}", operation, e)),
            Err(_) => Err(format!(
                "{} timed out after {}ms",
                operation,
                self.store_timeout.as_millis()
            )),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn metric_event_type(event: &WebhookEvent) -> &'static str {
    use crate::webhook::event::{PAYMENT_FAILED, PAYMENT_SUCCESS, REFUND_STATUS, SETTLEMENT_STATUS};

    match event {
        WebhookEvent::PaymentSuccess(_) => PAYMENT_SUCCESS,
        WebhookEvent::PaymentFailed(_) => PAYMENT_FAILED,
        WebhookEvent::RefundStatus(_) => REFUND_STATUS,
        WebhookEvent::SettlementStatus => SETTLEMENT_STATUS,
        WebhookEvent::Unknown => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::InMemoryPaymentStore;
    use axum::http::StatusCode;

    const SECRET: &str = "whsec_unit";
    const TIMESTAMP: &str = "1704067200";

    fn processor(store: Arc<InMemoryPaymentStore>) -> WebhookProcessor {
        WebhookProcessor::new(
            store,
            Secret::new(SECRET.to_string()),
            Duration::from_millis(500),
        )
    }

    fn signed(body: &str) -> String {
        signature::sign(SECRET, TIMESTAMP, body.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_empty_headers_count_as_missing() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let body = r#"{"type":"X","data":{}}"#;

        let err = processor(store.clone())
            .handle(Some(""), Some(TIMESTAMP), body.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookRejection::MissingHeaders));

        let err = processor(store.clone())
            .handle(Some(&signed(body)), None, body.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookRejection::MissingHeaders));
        assert!(store.webhook_logs().is_empty());
    }

    #[tokio::test]
    async fn test_bad_signature_never_parses_body() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let err = processor(store.clone())
            .handle(Some("bogus"), Some(TIMESTAMP), b"not even json")
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookRejection::InvalidSignature));
        assert!(store.webhook_logs().is_empty());
    }

    #[tokio::test]
    async fn test_missing_order_id_skips_projection() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let body = r#"{"type":"PAYMENT_FAILED_WEBHOOK","data":{"reason":"declined"}}"#;

        let receipt = processor(store.clone())
            .handle(Some(&signed(body)), Some(TIMESTAMP), body.as_bytes())
            .await
            .unwrap();

        assert_eq!(receipt.audit, SideEffect::Applied);
        assert_eq!(receipt.projection, SideEffect::skipped("missing order_id"));
        assert!(store.payment_updates().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_refund_is_reported_not_raised() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let body = r#"{"type":"REFUND_STATUS_WEBHOOK","data":{"refund_id":"nope","refund_status":"SUCCESS"}}"#;

        let receipt = processor(store.clone())
            .handle(Some(&signed(body)), Some(TIMESTAMP), body.as_bytes())
            .await
            .unwrap();

        assert_eq!(receipt.projection, SideEffect::failed("refund not found"));
        assert_eq!(store.webhook_logs().len(), 1);
    }

    #[tokio::test]
    async fn test_store_outage_is_recorded_in_receipt() {
        let store = Arc::new(InMemoryPaymentStore::new());
        store.set_fail_writes(true);
        let body = r#"{"type":"PAYMENT_FAILED_WEBHOOK","data":{"order_id":"o1"}}"#;

        let receipt = processor(store.clone())
            .handle(Some(&signed(body)), Some(TIMESTAMP), body.as_bytes())
            .await
            .unwrap();

        assert_eq!(receipt.audit.label(), "failed");
        assert_eq!(receipt.projection.label(), "failed");
        assert_eq!(receipt.order_id.as_deref(), Some("o1"));
    }

    #[tokio::test]
    async fn test_unset_secret_refuses_every_delivery() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let processor = WebhookProcessor::new(
            store.clone(),
            Secret::new(String::new()),
            Duration::from_millis(500),
        );
        let body = r#"{"type":"PAYMENT_SUCCESS_WEBHOOK","data":{"order_id":"o1"}}"#;
        let forged = signature::sign("", TIMESTAMP, body.as_bytes()).unwrap();

        let err = processor
            .handle(Some(&forged), Some(TIMESTAMP), body.as_bytes())
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookRejection::InvalidSignature));
        assert!(store.webhook_logs().is_empty());
        assert!(store.payment_updates().is_empty());
    }

    #[tokio::test]
    async fn test_slow_store_times_out_into_receipt() {
        let store = Arc::new(InMemoryPaymentStore::new());
        store.set_write_delay(Duration::from_millis(200));
        let processor = WebhookProcessor::new(
            store.clone(),
            Secret::new(SECRET.to_string()),
            Duration::from_millis(20),
        );
        let body = r#"{"type":"PAYMENT_FAILED_WEBHOOK","data":{"order_id":"o1"}}"#;

        let receipt = processor
            .handle(Some(&signed(body)), Some(TIMESTAMP), body.as_bytes())
            .await
            .unwrap();

        match (&receipt.audit, &receipt.projection) {
            (SideEffect::Failed { reason: audit }, SideEffect::Failed { reason: projection }) => {
                assert!(audit.contains("append_webhook_log timed out"), "{}", audit);
                assert!(projection.contains("update_payment_status timed out"), "{}", projection);
            }
            other => panic!("expected both writes to time out, got {:?}", other),
        }
        assert!(store.webhook_logs().is_empty());
    }

    #[test]
    fn test_rejection_status_codes() {
        assert_eq!(
            AppError::from(WebhookRejection::MissingHeaders).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(WebhookRejection::InvalidSignature).status_code(),
            StatusCode::UNAUTHORIZED
        );
        let malformed = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(
            AppError::from(WebhookRejection::MalformedPayload(malformed)).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
