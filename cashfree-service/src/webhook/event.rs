//! Webhook payload decoding.
//!
//! The body is decoded in two steps. The envelope only has to be a JSON
//! object with a string `type` and an object (or null) `data`; the typed
//! per-event structs then read fields out of `data` leniently, so a
//! wrongly-typed field becomes `None` instead of rejecting the delivery.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

pub const PAYMENT_SUCCESS: &str = "PAYMENT_SUCCESS_WEBHOOK";
pub const PAYMENT_FAILED: &str = "PAYMENT_FAILED_WEBHOOK";
pub const REFUND_STATUS: &str = "REFUND_STATUS_WEBHOOK";
pub const SETTLEMENT_STATUS: &str = "SETTLEMENT_STATUS_WEBHOOK";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type", default)]
    event_type: String,
    #[serde(default)]
    data: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PaymentSuccessData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cf_payment_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub payment_method: Option<String>,
    #[serde(default, deserialize_with = "lenient_rfc3339")]
    pub payment_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PaymentFailedData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RefundStatusData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub refund_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub refund_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_rfc3339")]
    pub processed_at: Option<DateTime<Utc>>,
}

/// A webhook classified by its declared `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    PaymentSuccess(PaymentSuccessData),
    PaymentFailed(PaymentFailedData),
    RefundStatus(RefundStatusData),
    SettlementStatus,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedWebhook {
    /// The `type` field exactly as sent.
    pub event_type: String,
    /// `data.order_id` when it is a string, whatever the event type.
    pub order_id: Option<String>,
    pub event: WebhookEvent,
}

impl ParsedWebhook {
    /// Decode a raw webhook body. Fails only when the envelope itself is
    /// not valid.
    pub fn parse(raw_body: &[u8]) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_slice(raw_body)?;
        let data = envelope.data.unwrap_or_default();

        let order_id = data
            .get("order_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let event = match envelope.event_type.as_str() {
            PAYMENT_SUCCESS => WebhookEvent::PaymentSuccess(decode(&data)),
            PAYMENT_FAILED => WebhookEvent::PaymentFailed(decode(&data)),
            REFUND_STATUS => WebhookEvent::RefundStatus(decode(&data)),
            SETTLEMENT_STATUS => WebhookEvent::SettlementStatus,
            _ => WebhookEvent::Unknown,
        };

        Ok(Self {
            event_type: envelope.event_type,
            order_id,
            event,
        })
    }
}

fn decode<T: DeserializeOwned + Default>(data: &Map<String, Value>) -> T {
    serde_json::from_value(Value::Object(data.clone())).unwrap_or_default()
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_rfc3339<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_payment_success_full() {
        let body = br#"{"type":"PAYMENT_SUCCESS_WEBHOOK","data":{"order_id":"o1","cf_payment_id":"p1","payment_method":"card","payment_time":"2024-01-01T00:00:00Z"}}"#;
        let parsed = ParsedWebhook::parse(body).unwrap();

        assert_eq!(parsed.event_type, PAYMENT_SUCCESS);
        assert_eq!(parsed.order_id.as_deref(), Some("o1"));
        assert_eq!(
            parsed.event,
            WebhookEvent::PaymentSuccess(PaymentSuccessData {
                order_id: Some("o1".to_string()),
                cf_payment_id: Some("p1".to_string()),
                payment_method: Some("card".to_string()),
                payment_time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            })
        );
    }

    #[test]
    fn test_wrongly_typed_fields_become_none() {
        let body = br#"{"type":"PAYMENT_SUCCESS_WEBHOOK","data":{"order_id":42,"cf_payment_id":123456,"payment_method":{"card":{}},"payment_time":"yesterday"}}"#;
        let parsed = ParsedWebhook::parse(body).unwrap();

        assert_eq!(parsed.order_id, None);
        assert_eq!(
            parsed.event,
            WebhookEvent::PaymentSuccess(PaymentSuccessData::default())
        );
    }

    #[test]
    fn test_offset_timestamp_is_normalised_to_utc() {
        let body = br#"{"type":"REFUND_STATUS_WEBHOOK","data":{"refund_id":"r1","refund_status":"SUCCESS","processed_at":"2024-01-01T05:30:00+05:30"}}"#;
        let parsed = ParsedWebhook::parse(body).unwrap();

        let WebhookEvent::RefundStatus(data) = parsed.event else {
            panic!("expected refund event");
        };
        assert_eq!(data.refund_id.as_deref(), Some("r1"));
        assert_eq!(data.refund_status.as_deref(), Some("SUCCESS"));
        assert_eq!(
            data.processed_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_order_id_extracted_for_every_type() {
        let body = br#"{"type":"SETTLEMENT_STATUS_WEBHOOK","data":{"order_id":"o9"}}"#;
        let parsed = ParsedWebhook::parse(body).unwrap();
        assert_eq!(parsed.event, WebhookEvent::SettlementStatus);
        assert_eq!(parsed.order_id.as_deref(), Some("o9"));

        let body = br#"{"type":"SOMETHING_UNKNOWN","data":{"order_id":"o10"}}"#;
        let parsed = ParsedWebhook::parse(body).unwrap();
        assert_eq!(parsed.event, WebhookEvent::Unknown);
        assert_eq!(parsed.event_type, "SOMETHING_UNKNOWN");
        assert_eq!(parsed.order_id.as_deref(), Some("o10"));
    }

    #[test]
    fn test_type_match_is_exact() {
        let parsed =
            ParsedWebhook::parse(br#"{"type":"payment_success_webhook","data":{}}"#).unwrap();
        assert_eq!(parsed.event, WebhookEvent::Unknown);
    }

    #[test]
    fn test_missing_or_null_data_is_empty() {
        let parsed = ParsedWebhook::parse(br#"{"type":"PAYMENT_FAILED_WEBHOOK"}"#).unwrap();
        assert_eq!(
            parsed.event,
            WebhookEvent::PaymentFailed(PaymentFailedData::default())
        );

        let parsed =
            ParsedWebhook::parse(br#"{"type":"PAYMENT_FAILED_WEBHOOK","data":null}"#).unwrap();
        assert_eq!(parsed.order_id, None);
    }

    #[test]
    fn test_invalid_envelopes_rejected() {
        assert!(ParsedWebhook::parse(b"not json").is_err());
        assert!(ParsedWebhook::parse(b"[1,2,3]").is_err());
        assert!(ParsedWebhook::parse(br#"{"type":7,"data":{}}"#).is_err());
        assert!(ParsedWebhook::parse(br#"{"type":"X","data":"oops"}"#).is_err());
    }
}
