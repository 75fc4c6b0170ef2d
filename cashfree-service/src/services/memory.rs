//! In-process `PaymentStore` for tests and local runs without Postgres.

use crate::models::{
    Payment, PaymentStatusUpdate, Refund, RefundStatusUpdate, Settlement, SplitSettlement,
    WebhookLog,
};
use crate::services::repository::PaymentStore;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct Tables {
    payments: Vec<Payment>,
    refunds: Vec<Refund>,
    settlements: Vec<Settlement>,
    splits: Vec<SplitSettlement>,
    webhooks: Vec<WebhookLog>,
}

/// Vec-backed store guarded by a mutex.
///
/// `fail_writes` makes every mutating call return an error and
/// `write_delay` makes each one stall first, which is how tests simulate an
/// unavailable or slow database.
#[derive(Default)]
pub struct InMemoryPaymentStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
    write_delay_ms: AtomicU64,
    payment_updates: Mutex<Vec<(String, PaymentStatusUpdate)>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn webhook_logs(&self) -> Vec<WebhookLog> {
        self.lock().webhooks.clone()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.lock().payments.clone()
    }

    pub fn refunds(&self) -> Vec<Refund> {
        self.lock().refunds.clone()
    }

    pub fn split_settlements(&self) -> Vec<SplitSettlement> {
        self.lock().splits.clone()
    }

    /// Every `update_payment_status` call made so far, including ones that
    /// matched no row.
    pub fn payment_updates(&self) -> Vec<(String, PaymentStatusUpdate)> {
        self.payment_updates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn check_writable(&self) -> Result<()> {
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("store unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create_payment(&self, payment: &Payment) -> Result<()> {
        self.check_writable().await?;
        let mut tables = self.lock();
        if tables.payments.iter().any(|p| p.order_id == payment.order_id) {
            bail!("payment {} already exists", payment.order_id);
        }
        tables.payments.push(payment.clone());
        Ok(())
    }

    async fn get_payment_by_order_id(&self, order_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .lock()
            .payments
            .iter()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn list_payments(&self, limit: i64, offset: i64) -> Result<Vec<Payment>> {
        let mut payments = self.lock().payments.clone();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_payment_status(
        &self,
        order_id: &str,
        update: &PaymentStatusUpdate,
    ) -> Result<u64> {
        self.check_writable().await?;
        self.payment_updates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((order_id.to_string(), update.clone()));

        let mut tables = self.lock();
        let Some(payment) = tables.payments.iter_mut().find(|p| p.order_id == order_id) else {
            return Ok(0);
        };
        payment.status = update.status.clone();
        payment.cf_payment_id = update.cf_payment_id.clone();
        payment.payment_method = update.payment_method.clone();
        payment.payment_time = update.payment_time;
        payment.updated_at = Utc::now();
        Ok(1)
    }

    async fn create_refund(&self, refund: &Refund) -> Result<()> {
        self.check_writable().await?;
        let mut tables = self.lock();
        if tables.refunds.iter().any(|r| r.refund_id == refund.refund_id) {
            bail!("refund {} already exists", refund.refund_id);
        }
        tables.refunds.push(refund.clone());
        Ok(())
    }

    async fn get_refund_by_id(&self, refund_id: &str) -> Result<Option<Refund>> {
        Ok(self
            .lock()
            .refunds
            .iter()
            .find(|r| r.refund_id == refund_id)
            .cloned())
    }

    async fn update_refund_status(
        &self,
        refund_id: &str,
        update: &RefundStatusUpdate,
    ) -> Result<u64> {
        self.check_writable().await?;
        let mut tables = self.lock();
        let Some(refund) = tables.refunds.iter_mut().find(|r| r.refund_id == refund_id) else {
            return Ok(0);
        };
        if let Some(status) = &update.status {
            refund.status = status.clone();
        }
        refund.processed_at = update.processed_at;
        refund.updated_at = Utc::now();
        Ok(1)
    }

    async fn create_split_settlements(&self, splits: &[SplitSettlement]) -> Result<()> {
        self.check_writable().await?;
        self.lock().splits.extend_from_slice(splits);
        Ok(())
    }

    async fn create_settlement(&self, settlement: &Settlement) -> Result<()> {
        self.check_writable().await?;
        self.lock().settlements.push(settlement.clone());
        Ok(())
    }

    async fn get_settlement_by_id(&self, settlement_id: &str) -> Result<Option<Settlement>> {
        Ok(self
            .lock()
            .settlements
            .iter()
            .find(|s| s.settlement_id == settlement_id)
            .cloned())
    }

    async fn append_webhook_log(&self, record: &WebhookLog) -> Result<()> {
        self.check_writable().await?;
        self.lock().webhooks.push(record.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.check_writable().await
    }
}
