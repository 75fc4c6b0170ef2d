//! Application startup and lifecycle management.

use crate::config::{CashfreeServiceConfig, CorsConfig};
use crate::handlers::{self, payments, refunds, settlements, webhook};
use crate::services::{CashfreeClient, PaymentRepository, PaymentStore};
use crate::webhook::WebhookProcessor;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    tracing::{make_http_span, request_id_middleware},
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CashfreeServiceConfig>,
    pub store: Arc<dyn PaymentStore>,
    pub cashfree: CashfreeClient,
    pub webhooks: WebhookProcessor,
}

impl AppState {
    /// Wire the webhook processor to the same store and secret as the rest of the app.
    pub fn new(
        config: CashfreeServiceConfig,
        store: Arc<dyn PaymentStore>,
        cashfree: CashfreeClient,
    ) -> Self {
        let webhooks = WebhookProcessor::new(
            store.clone(),
            config.cashfree.client_secret.clone(),
            config.webhook.store_timeout,
        );

        Self {
            config: Arc::new(config),
            store,
            cashfree,
            webhooks,
        }
    }
}

/// Full HTTP surface: probes and metrics at the root, the API under `/api/v1`.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/payments/create-session", post(payments::create_session))
        .route("/payments/verify", post(payments::verify_payment))
        .route("/payments", get(payments::list_payments))
        .route("/payments/:order_id", get(payments::get_payment))
        .route("/payments/:order_id/refund", post(refunds::create_refund))
        .route("/payments/:order_id/cancel", post(payments::cancel_payment))
        .route(
            "/payments/:order_id/split",
            post(settlements::create_split_settlement),
        )
        .route("/settlements/:settlement_id", get(settlements::get_settlement))
        .route("/refunds/:refund_id", get(refunds::get_refund))
        .route("/webhook/cashfree", post(webhook::cashfree_webhook));

    let cors = cors_layer(&state.config.cors);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .nest("/api/v1", api)
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_http_span))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let allow_origin = if config.allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origin_values(&config.allowed_origins))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::CONTENT_LENGTH,
            header::ACCEPT_ENCODING,
            HeaderName::from_static("x-csrf-token"),
            header::AUTHORIZATION,
            header::ACCEPT,
            header::ORIGIN,
            header::CACHE_CONTROL,
            HeaderName::from_static("x-requested-with"),
        ])
}

/// Parse configured origins, dropping (and reporting) any that are not
/// valid header values.
fn origin_values(origins: &[String]) -> Vec<HeaderValue> {
    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if values.is_empty() {
        tracing::warn!("No valid CORS origins configured, cross-origin requests will be refused");
    }
    values
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    repository: PaymentRepository,
}

impl Application {
    /// Connect to Postgres, run migrations and bind the listener.
    ///
    /// Port 0 binds a random port, which tests rely on.
    pub async fn build(config: CashfreeServiceConfig) -> Result<Self, AppError> {
        let repository = PaymentRepository::connect(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            AppError::DatabaseError(e)
        })?;

        repository.run_migrations().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            AppError::DatabaseError(e)
        })?;

        let cashfree = CashfreeClient::new(config.cashfree.clone())
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;
        if cashfree.is_configured() {
            tracing::info!(
                environment = %config.cashfree.environment,
                base_url = %cashfree.base_url(),
                "Cashfree client initialized"
            );
        } else {
            tracing::warn!("Cashfree credentials not configured - gateway calls and webhooks will be refused");
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        let store: Arc<dyn PaymentStore> = Arc::new(repository.clone());
        let router = build_router(AppState::new(config, store, cashfree));

        tracing::info!("cashfree-service: HTTP on port {}", port);

        Ok(Self {
            port,
            listener,
            router,
            repository,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until `shutdown` resolves, then drain connections and close the pool.
    pub async fn run_until_stopped(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let result = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await;

        self.repository.close().await;

        result.map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
