//! Cashfree webhook ingestion: authenticate, audit, then project status.

pub mod event;
pub mod processor;
pub mod signature;

pub use event::{ParsedWebhook, WebhookEvent};
pub use processor::{SideEffect, WebhookProcessor, WebhookReceipt, WebhookRejection};

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";
