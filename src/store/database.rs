use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveValue::Set,
    ColumnTrait, DbErr, EntityTrait, QueryFilter,
};
use tracing::instrument;

use crate::db::DbPool;
use crate::entities::order;
use crate::errors::ServiceError;
use crate::services::reconciliation::OrderStatus;

use super::{ApplyOutcome, CreateOutcome, NewOrder, OrderStore};

/// sea-orm implementation. All conditional writes are single UPDATE
/// statements with the precondition in the WHERE clause, so concurrency
/// control is delegated to the database.
#[derive(Clone)]
pub struct SeaOrmOrderStore {
    db: Arc<DbPool>,
}

impl SeaOrmOrderStore {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Disambiguates a zero-row conditional update.
    async fn classify_missed_update(&self, order_id: &str) -> Result<ApplyOutcome, ServiceError> {
        match self.get(order_id).await? {
            Some(_) => Ok(ApplyOutcome::Conflict),
            None => Ok(ApplyOutcome::NotFound),
        }
    }
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    async fn get(&self, order_id: &str) -> Result<Option<order::Model>, ServiceError> {
        order::Entity::find_by_id(order_id.to_owned())
            .one(&*self.db)
            .await
            .map_err(ServiceError::from)
    }

    async fn find_for_customer(
        &self,
        customer_key: &str,
        order_id: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        order::Entity::find()
            .filter(order::Column::OrderId.eq(order_id))
            .filter(order::Column::CustomerPhone.eq(customer_key))
            .one(&*self.db)
            .await
            .map_err(ServiceError::from)
    }

    #[instrument(skip(self, new_order), fields(order_id = %new_order.order_id))]
    async fn create_if_absent(&self, new_order: NewOrder) -> Result<CreateOutcome, ServiceError> {
        let model = new_order.into_model(Utc::now());
        let active = order::ActiveModel {
            order_id: Set(model.order_id),
            amount: Set(model.amount),
            currency: Set(model.currency),
            customer_id: Set(model.customer_id),
            customer_name: Set(model.customer_name),
            customer_email: Set(model.customer_email),
            customer_phone: Set(model.customer_phone),
            payment_session_id: Set(model.payment_session_id),
            status: Set(model.status),
            original_order_id: Set(model.original_order_id),
            created_at: Set(model.created_at),
            updated_at: Set(model.updated_at),
        };

        match order::Entity::insert(active)
            .on_conflict(
                OnConflict::column(order::Column::OrderId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec(&*self.db)
            .await
        {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(DbErr::RecordNotInserted) => Ok(CreateOutcome::AlreadyExists),
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self), fields(new_status = %new_status))]
    async fn apply_status(
        &self,
        order_id: &str,
        new_status: OrderStatus,
        expected_prior: &[OrderStatus],
    ) -> Result<ApplyOutcome, ServiceError> {
        let expected: Vec<String> = expected_prior.iter().map(ToString::to_string).collect();
        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::OrderId.eq(order_id))
            .filter(order::Column::Status.is_in(expected))
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            Ok(ApplyOutcome::Updated)
        } else {
            self.classify_missed_update(order_id).await
        }
    }

    #[instrument(skip(self, payment_session_id))]
    async fn attach_session(
        &self,
        order_id: &str,
        payment_session_id: &str,
    ) -> Result<ApplyOutcome, ServiceError> {
        let result = order::Entity::update_many()
            .col_expr(
                order::Column::PaymentSessionId,
                Expr::value(Some(payment_session_id.to_owned())),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::OrderId.eq(order_id))
            .filter(order::Column::PaymentSessionId.is_null())
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            Ok(ApplyOutcome::Updated)
        } else {
            self.classify_missed_update(order_id).await
        }
    }
}
