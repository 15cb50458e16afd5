use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::services::reconciliation::OrderStatus;

/// Persistent record for one payment order.
///
/// `order_id` is immutable once assigned. `payment_session_id` is set at most
/// once per order; a replacement session always lives on a new `order_id`
/// (derived orders carry `original_order_id` back-references).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub payment_session_id: Option<String>,
    pub status: String,
    pub original_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parses the stored status string. A row that fails to parse indicates
    /// out-of-band writes; surfaced as an internal error, never coerced.
    pub fn order_status(&self) -> Result<OrderStatus, crate::errors::ServiceError> {
        self.status.parse::<OrderStatus>().map_err(|_| {
            crate::errors::ServiceError::InternalError(format!(
                "order {} has unrecognized stored status '{}'",
                self.order_id, self.status
            ))
        })
    }
}
