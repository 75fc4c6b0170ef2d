//! Configuration module for cashfree-service.

use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const SANDBOX_BASE_URL: &str = "https://sandbox.cashfree.com/pg";
pub const PRODUCTION_BASE_URL: &str = "https://api.cashfree.com/pg";
pub const DEFAULT_API_VERSION: &str = "2023-08-01";

#[derive(Debug, Clone)]
pub struct CashfreeServiceConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub cashfree: CashfreeConfig,
    pub webhook: WebhookConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct CashfreeConfig {
    pub client_id: String,
    /// API secret, also the HMAC key for webhook signatures.
    pub client_secret: Secret<String>,
    pub environment: String,
    pub api_base_url: String,
    pub api_version: String,
    pub timeout: Duration,
    /// Upper bound on time spent retrying transient failures. Zero disables retries.
    pub retry_max_elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Per-operation bound on webhook store writes.
    pub store_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl CashfreeServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let environment = env::var("CASHFREE_ENVIRONMENT").unwrap_or_else(|_| "TEST".to_string());
        let api_base_url = env::var("CASHFREE_API_BASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| base_url_for(&environment).to_string());

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "cashfree-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: Secret::new(env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 30),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", 5),
            },
            cashfree: CashfreeConfig {
                client_id: env::var("CASHFREE_CLIENT_ID").unwrap_or_default(),
                client_secret: Secret::new(env::var("CASHFREE_CLIENT_SECRET").unwrap_or_default()),
                environment,
                api_base_url,
                api_version: env::var("CASHFREE_API_VERSION")
                    .unwrap_or_else(|_| DEFAULT_API_VERSION.to_string()),
                timeout: Duration::from_secs(env_or("CASHFREE_TIMEOUT_SECONDS", 30)),
                retry_max_elapsed: Duration::from_secs(env_or(
                    "CASHFREE_RETRY_MAX_ELAPSED_SECONDS",
                    15,
                )),
            },
            webhook: WebhookConfig {
                store_timeout: Duration::from_millis(env_or("WEBHOOK_STORE_TIMEOUT_MS", 5000)),
            },
            cors: CorsConfig {
                allowed_origins: parse_origins(
                    &env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()),
                ),
            },
        })
    }
}

/// `PROD` (any case) selects the production API; everything else is sandbox.
pub fn base_url_for(environment: &str) -> &'static str {
    if environment.trim().eq_ignore_ascii_case("PROD") {
        PRODUCTION_BASE_URL
    } else {
        SANDBOX_BASE_URL
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect();

    if origins.iter().any(|origin| origin == "*") {
        Vec::new()
    } else {
        origins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_for_environment() {
        assert_eq!(base_url_for("PROD"), PRODUCTION_BASE_URL);
        assert_eq!(base_url_for("prod"), PRODUCTION_BASE_URL);
        assert_eq!(base_url_for("TEST"), SANDBOX_BASE_URL);
        assert_eq!(base_url_for(""), SANDBOX_BASE_URL);
        assert_eq!(base_url_for("production"), SANDBOX_BASE_URL);
    }

    #[test]
    fn test_parse_origins() {
        assert!(parse_origins("*").is_empty());
        assert!(parse_origins("https://a.example, *").is_empty());
        assert_eq!(
            parse_origins(" https://a.example ,https://b.example,, "),
            vec!["https://a.example", "https://b.example"]
        );
    }
}
