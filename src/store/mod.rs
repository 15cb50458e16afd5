pub mod database;
pub mod memory;

pub use database::SeaOrmOrderStore;
pub use memory::InMemoryOrderStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::entities::order;
use crate::errors::ServiceError;
use crate::services::reconciliation::OrderStatus;

/// Outcome of `create_if_absent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Outcome of a conditional write. `Conflict` means the precondition did not
/// hold; callers on automated paths treat it as already-satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Updated,
    Conflict,
    NotFound,
}

/// Input record for a new order row. Status always starts at `Pending`.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub payment_session_id: Option<String>,
    pub original_order_id: Option<String>,
}

impl NewOrder {
    pub(crate) fn into_model(self, now: DateTime<Utc>) -> order::Model {
        order::Model {
            order_id: self.order_id,
            amount: self.amount,
            currency: self.currency,
            customer_id: self.customer_id,
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            customer_phone: self.customer_phone,
            payment_session_id: self.payment_session_id,
            status: OrderStatus::Pending.to_string(),
            original_order_id: self.original_order_id,
            created_at: now,
            updated_at: Some(now),
        }
    }
}

/// Persistence contract for order records. The conditional writes are the
/// only mutation discipline in the system; no caller locks around them.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, order_id: &str) -> Result<Option<order::Model>, ServiceError>;

    /// Scoped lookup for the resume path: the order must belong to the
    /// customer key it is being resumed under.
    async fn find_for_customer(
        &self,
        customer_key: &str,
        order_id: &str,
    ) -> Result<Option<order::Model>, ServiceError>;

    /// Atomic insert; an existing row is reported, never overwritten.
    async fn create_if_absent(&self, order: NewOrder) -> Result<CreateOutcome, ServiceError>;

    /// Advances `status` only when the stored value is one of
    /// `expected_prior`. Tolerates concurrent writers racing on one order.
    async fn apply_status(
        &self,
        order_id: &str,
        new_status: OrderStatus,
        expected_prior: &[OrderStatus],
    ) -> Result<ApplyOutcome, ServiceError>;

    /// Sets `payment_session_id` only while it is still unset.
    async fn attach_session(
        &self,
        order_id: &str,
        payment_session_id: &str,
    ) -> Result<ApplyOutcome, ServiceError>;
}
