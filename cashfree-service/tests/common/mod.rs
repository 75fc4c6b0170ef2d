#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use cashfree_service::config::{
    CashfreeConfig, CashfreeServiceConfig, CorsConfig, DatabaseConfig, WebhookConfig,
};
use cashfree_service::models::{status, Payment};
use cashfree_service::services::{CashfreeClient, InMemoryPaymentStore, PaymentStore};
use cashfree_service::startup::{build_router, AppState};
use cashfree_service::webhook::signature;
use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::Secret;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::MockServer;

pub const CLIENT_ID: &str = "test_client_id";
pub const CLIENT_SECRET: &str = "test_client_secret";
pub const WEBHOOK_TIMESTAMP: &str = "1704067200";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryPaymentStore>,
    pub cashfree: MockServer,
}

pub fn test_config(cashfree_base_url: &str, retry_max_elapsed: Duration) -> CashfreeServiceConfig {
    CashfreeServiceConfig {
        common: service_core::config::Config { port: 0 },
        service_name: "cashfree-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: Secret::new("postgres://unused".to_string()),
            max_connections: 1,
            min_connections: 0,
        },
        cashfree: CashfreeConfig {
            client_id: CLIENT_ID.to_string(),
            client_secret: Secret::new(CLIENT_SECRET.to_string()),
            environment: "TEST".to_string(),
            api_base_url: cashfree_base_url.to_string(),
            api_version: "2023-08-01".to_string(),
            timeout: Duration::from_secs(5),
            retry_max_elapsed,
        },
        webhook: WebhookConfig {
            store_timeout: Duration::from_millis(500),
        },
        cors: CorsConfig {
            allowed_origins: Vec::new(),
        },
    }
}

impl TestApp {
    /// Router over an in-memory store, with Cashfree stubbed and retries off.
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with_retry_budget(retry_max_elapsed: Duration) -> Self {
        Self::spawn_with(|config| config.cashfree.retry_max_elapsed = retry_max_elapsed).await
    }

    /// Same as `spawn`, with the config adjusted before the router is built.
    pub async fn spawn_with(configure: impl FnOnce(&mut CashfreeServiceConfig)) -> Self {
        let cashfree = MockServer::start().await;
        let mut config = test_config(&cashfree.uri(), Duration::ZERO);
        configure(&mut config);

        let store = Arc::new(InMemoryPaymentStore::new());
        let client =
            CashfreeClient::new(config.cashfree.clone()).expect("Failed to build Cashfree client");
        let state = AppState::new(config, store.clone(), client);

        TestApp {
            router: build_router(state),
            store,
            cashfree,
        }
    }

    pub async fn request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Deliver a webhook with optional headers, exactly as given.
    pub async fn post_webhook(
        &self,
        body: &str,
        signature: Option<&str>,
        timestamp: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/webhook/cashfree")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-webhook-signature", signature);
        }
        if let Some(timestamp) = timestamp {
            builder = builder.header("x-webhook-timestamp", timestamp);
        }

        self.request(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// Deliver a correctly signed webhook.
    pub async fn post_signed_webhook(&self, body: &str) -> (StatusCode, Value) {
        let signature = sign(body);
        self.post_webhook(body, Some(&signature), Some(WEBHOOK_TIMESTAMP))
            .await
    }

    pub async fn seed_payment(&self, order_id: &str, amount: Decimal) -> Payment {
        let payment = payment(order_id, amount);
        self.store
            .create_payment(&payment)
            .await
            .expect("Failed to seed payment");
        payment
    }

    pub async fn stored_payment(&self, order_id: &str) -> Option<Payment> {
        self.store
            .get_payment_by_order_id(order_id)
            .await
            .expect("Failed to read payment")
    }
}

pub fn sign(body: &str) -> String {
    signature::sign(CLIENT_SECRET, WEBHOOK_TIMESTAMP, body.as_bytes())
        .expect("Failed to sign webhook")
}

pub fn payment(order_id: &str, amount: Decimal) -> Payment {
    let now = Utc::now();
    Payment {
        id: Uuid::new_v4(),
        order_id: order_id.to_string(),
        cf_order_id: format!("cf_{}", order_id),
        amount,
        currency: "INR".to_string(),
        status: status::CREATED.to_string(),
        payment_method: None,
        customer_id: "cust_1".to_string(),
        customer_name: "Meera".to_string(),
        customer_email: "meera@example.com".to_string(),
        customer_phone: "9876543210".to_string(),
        description: None,
        payment_url: None,
        cf_payment_id: None,
        payment_time: None,
        created_at: now,
        updated_at: now,
    }
}
