pub mod cashfree;
pub mod memory;
pub mod metrics;
pub mod repository;

pub use cashfree::{CashfreeClient, CashfreeError};
pub use memory::InMemoryPaymentStore;
pub use metrics::{get_metrics, init_metrics};
pub use repository::{PaymentRepository, PaymentStore};
