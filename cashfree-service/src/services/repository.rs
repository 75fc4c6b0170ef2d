//! Persistence for payments, refunds, settlements and webhook audit logs.

use crate::models::{
    Payment, PaymentStatusUpdate, Refund, RefundStatusUpdate, Settlement, SplitSettlement,
    WebhookLog,
};
use crate::services::metrics::QueryTimer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

/// Storage operations used by the HTTP handlers and the webhook projector.
///
/// Every call is independent; nothing here spans more than one statement
/// except `create_split_settlements`.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create_payment(&self, payment: &Payment) -> Result<()>;
    async fn get_payment_by_order_id(&self, order_id: &str) -> Result<Option<Payment>>;
    async fn list_payments(&self, limit: i64, offset: i64) -> Result<Vec<Payment>>;
    /// Returns the number of rows changed; zero means no payment has that `order_id`.
    async fn update_payment_status(
        &self,
        order_id: &str,
        update: &PaymentStatusUpdate,
    ) -> Result<u64>;

    async fn create_refund(&self, refund: &Refund) -> Result<()>;
    async fn get_refund_by_id(&self, refund_id: &str) -> Result<Option<Refund>>;
    /// Returns the number of rows changed; zero means no refund has that `refund_id`.
    async fn update_refund_status(
        &self,
        refund_id: &str,
        update: &RefundStatusUpdate,
    ) -> Result<u64>;

    async fn create_split_settlements(&self, splits: &[SplitSettlement]) -> Result<()>;
    async fn create_settlement(&self, settlement: &Settlement) -> Result<()>;
    async fn get_settlement_by_id(&self, settlement_id: &str) -> Result<Option<Settlement>>;

    async fn append_webhook_log(&self, record: &WebhookLog) -> Result<()>;

    async fn health_check(&self) -> Result<()>;
}

const PAYMENT_COLUMNS: &str = "id, order_id, cf_order_id, amount, currency, status, \
     payment_method, customer_id, customer_name, customer_email, customer_phone, \
     description, payment_url, cf_payment_id, payment_time, created_at, updated_at";

const REFUND_COLUMNS: &str = "id, refund_id, cf_refund_id, order_id, cf_order_id, amount, \
     status, reason, processed_at, created_at, updated_at";

const SETTLEMENT_COLUMNS: &str = "id, settlement_id, order_id, cf_order_id, amount, status, \
     utr, settled_at, created_at, updated_at";

/// Postgres-backed store.
#[derive(Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    /// Open a connection pool.
    #[instrument(skip(database_url), fields(service = "cashfree-service"))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(30 * 60))
            .max_lifetime(Duration::from_secs(60 * 60))
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Migration failed")?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL connection pool closed");
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    #[instrument(skip(self, payment), fields(order_id = %payment.order_id))]
    async fn create_payment(&self, payment: &Payment) -> Result<()> {
        let _timer = QueryTimer::start("create_payment");

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_id, cf_order_id, amount, currency, status,
                customer_id, customer_name, customer_email, customer_phone,
                description, payment_url, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(payment.id)
        .bind(&payment.order_id)
        .bind(&payment.cf_order_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(&payment.status)
        .bind(&payment.customer_id)
        .bind(&payment.customer_name)
        .bind(&payment.customer_email)
        .bind(&payment.customer_phone)
        .bind(&payment.description)
        .bind(&payment.payment_url)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert payment")?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_payment_by_order_id(&self, order_id: &str) -> Result<Option<Payment>> {
        let _timer = QueryTimer::start("get_payment_by_order_id");

        let query = format!("SELECT {} FROM payments WHERE order_id = $1", PAYMENT_COLUMNS);
        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch payment")?;

        Ok(payment)
    }

    #[instrument(skip(self))]
    async fn list_payments(&self, limit: i64, offset: i64) -> Result<Vec<Payment>> {
        let _timer = QueryTimer::start("list_payments");

        let query = format!(
            "SELECT {} FROM payments ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            PAYMENT_COLUMNS
        );
        let payments = sqlx::query_as::<_, Payment>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list payments")?;

        Ok(payments)
    }

    #[instrument(skip(self, update), fields(status = %update.status))]
    async fn update_payment_status(
        &self,
        order_id: &str,
        update: &PaymentStatusUpdate,
    ) -> Result<u64> {
        let _timer = QueryTimer::start("update_payment_status");

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $1, cf_payment_id = $2, payment_method = $3,
                payment_time = $4, updated_at = $5
            WHERE order_id = $6
            "#,
        )
        .bind(&update.status)
        .bind(&update.cf_payment_id)
        .bind(&update.payment_method)
        .bind(update.payment_time)
        .bind(Utc::now())
        .bind(order_id)
        .execute(&self.pool)
        .await
        .context("Failed to update payment status")?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, refund), fields(refund_id = %refund.refund_id))]
    async fn create_refund(&self, refund: &Refund) -> Result<()> {
        let _timer = QueryTimer::start("create_refund");

        sqlx::query(
            r#"
            INSERT INTO refunds (
                id, refund_id, cf_refund_id, order_id, cf_order_id, amount,
                status, reason, processed_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(refund.id)
        .bind(&refund.refund_id)
        .bind(&refund.cf_refund_id)
        .bind(&refund.order_id)
        .bind(&refund.cf_order_id)
        .bind(refund.amount)
        .bind(&refund.status)
        .bind(&refund.reason)
        .bind(refund.processed_at)
        .bind(refund.created_at)
        .bind(refund.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert refund")?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_refund_by_id(&self, refund_id: &str) -> Result<Option<Refund>> {
        let _timer = QueryTimer::start("get_refund_by_id");

        let query = format!("SELECT {} FROM refunds WHERE refund_id = $1", REFUND_COLUMNS);
        let refund = sqlx::query_as::<_, Refund>(&query)
            .bind(refund_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch refund")?;

        Ok(refund)
    }

    #[instrument(skip(self, update))]
    async fn update_refund_status(
        &self,
        refund_id: &str,
        update: &RefundStatusUpdate,
    ) -> Result<u64> {
        let _timer = QueryTimer::start("update_refund_status");

        let result = sqlx::query(
            r#"
            UPDATE refunds
            SET status = COALESCE($1, status), processed_at = $2, updated_at = $3
            WHERE refund_id = $4
            "#,
        )
        .bind(&update.status)
        .bind(update.processed_at)
        .bind(Utc::now())
        .bind(refund_id)
        .execute(&self.pool)
        .await
        .context("Failed to update refund status")?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, splits), fields(count = splits.len()))]
    async fn create_split_settlements(&self, splits: &[SplitSettlement]) -> Result<()> {
        let _timer = QueryTimer::start("create_split_settlements");

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        for split in splits {
            sqlx::query(
                r#"
                INSERT INTO split_settlements (
                    id, order_id, cf_order_id, vendor_id, amount, percentage,
                    split_type, status, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(split.id)
            .bind(&split.order_id)
            .bind(&split.cf_order_id)
            .bind(&split.vendor_id)
            .bind(split.amount)
            .bind(split.percentage)
            .bind(&split.split_type)
            .bind(&split.status)
            .bind(split.created_at)
            .bind(split.updated_at)
            .execute(&mut *tx)
            .await
            .context("Failed to insert split settlement")?;
        }

        tx.commit().await.context("Failed to commit split settlements")?;
        Ok(())
    }

    #[instrument(skip(self, settlement), fields(settlement_id = %settlement.settlement_id))]
    async fn create_settlement(&self, settlement: &Settlement) -> Result<()> {
        let _timer = QueryTimer::start("create_settlement");

        sqlx::query(
            r#"
            INSERT INTO settlements (
                id, settlement_id, order_id, cf_order_id, amount, status,
                utr, settled_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(settlement.id)
        .bind(&settlement.settlement_id)
        .bind(&settlement.order_id)
        .bind(&settlement.cf_order_id)
        .bind(settlement.amount)
        .bind(&settlement.status)
        .bind(&settlement.utr)
        .bind(settlement.settled_at)
        .bind(settlement.created_at)
        .bind(settlement.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert settlement")?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_settlement_by_id(&self, settlement_id: &str) -> Result<Option<Settlement>> {
        let _timer = QueryTimer::start("get_settlement_by_id");

        let query = format!(
            "SELECT {} FROM settlements WHERE settlement_id = $1",
            SETTLEMENT_COLUMNS
        );
        let settlement = sqlx::query_as::<_, Settlement>(&query)
            .bind(settlement_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch settlement")?;

        Ok(settlement)
    }

    #[instrument(skip(self, record), fields(event_type = %record.event_type))]
    async fn append_webhook_log(&self, record: &WebhookLog) -> Result<()> {
        let _timer = QueryTimer::start("append_webhook_log");

        sqlx::query(
            r#"
            INSERT INTO webhooks (id, event_type, order_id, payload, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(&record.event_type)
        .bind(&record.order_id)
        .bind(&record.payload)
        .bind(&record.status)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert webhook log")?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Health check failed")?;
        Ok(())
    }
}
