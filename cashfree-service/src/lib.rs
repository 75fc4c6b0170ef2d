//! cashfree-service: Cashfree payment gateway integration.
//!
//! Order sessions, verification, refunds, cancellations and split
//! settlements pass through to Cashfree; signed webhooks are audited and
//! projected onto the stored payment and refund records.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
pub mod webhook;

pub use startup::{build_router, AppState, Application};
