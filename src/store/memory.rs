use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::entities::order;
use crate::errors::ServiceError;
use crate::services::reconciliation::OrderStatus;

use super::{ApplyOutcome, CreateOutcome, NewOrder, OrderStore};

/// DashMap-backed store with the same conditional-write contract as the
/// database implementation. Per-key shard locks make each write atomic.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<String, order::Model>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get(&self, order_id: &str) -> Result<Option<order::Model>, ServiceError> {
        Ok(self.orders.get(order_id).map(|row| row.clone()))
    }

    async fn find_for_customer(
        &self,
        customer_key: &str,
        order_id: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(self
            .orders
            .get(order_id)
            .filter(|row| row.customer_phone == customer_key)
            .map(|row| row.clone()))
    }

    async fn create_if_absent(&self, new_order: NewOrder) -> Result<CreateOutcome, ServiceError> {
        match self.orders.entry(new_order.order_id.clone()) {
            Entry::Occupied(_) => Ok(CreateOutcome::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(new_order.into_model(Utc::now()));
                Ok(CreateOutcome::Created)
            }
        }
    }

    async fn apply_status(
        &self,
        order_id: &str,
        new_status: OrderStatus,
        expected_prior: &[OrderStatus],
    ) -> Result<ApplyOutcome, ServiceError> {
        match self.orders.get_mut(order_id) {
            None => Ok(ApplyOutcome::NotFound),
            Some(mut row) => {
                let current = row.order_status()?;
                if expected_prior.contains(&current) {
                    row.status = new_status.to_string();
                    row.updated_at = Some(Utc::now());
                    Ok(ApplyOutcome::Updated)
                } else {
                    Ok(ApplyOutcome::Conflict)
                }
            }
        }
    }

    async fn attach_session(
        &self,
        order_id: &str,
        payment_session_id: &str,
    ) -> Result<ApplyOutcome, ServiceError> {
        match self.orders.get_mut(order_id) {
            None => Ok(ApplyOutcome::NotFound),
            Some(mut row) => {
                if row.payment_session_id.is_some() {
                    Ok(ApplyOutcome::Conflict)
                } else {
                    row.payment_session_id = Some(payment_session_id.to_owned());
                    row.updated_at = Some(Utc::now());
                    Ok(ApplyOutcome::Updated)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_order(order_id: &str) -> NewOrder {
        NewOrder {
            order_id: order_id.into(),
            amount: dec!(100),
            currency: "INR".into(),
            customer_id: "C-1".into(),
            customer_name: "Asha".into(),
            customer_email: "asha@example.com".into(),
            customer_phone: "9612300001".into(),
            payment_session_id: None,
            original_order_id: None,
        }
    }

    #[tokio::test]
    async fn create_if_absent_reports_duplicates() {
        let store = InMemoryOrderStore::new();
        assert_eq!(
            store.create_if_absent(new_order("O-1")).await.unwrap(),
            CreateOutcome::Created
        );
        assert_eq!(
            store.create_if_absent(new_order("O-1")).await.unwrap(),
            CreateOutcome::AlreadyExists
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn apply_status_enforces_expected_prior() {
        let store = InMemoryOrderStore::new();
        store.create_if_absent(new_order("O-1")).await.unwrap();

        let outcome = store
            .apply_status("O-1", OrderStatus::Completed, &[OrderStatus::Pending])
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Updated);

        let outcome = store
            .apply_status("O-1", OrderStatus::Cancelled, &[OrderStatus::Pending])
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Conflict);

        let stored = store.get("O-1").await.unwrap().unwrap();
        assert_eq!(stored.status, "completed");
    }

    #[tokio::test]
    async fn apply_status_reports_missing_rows() {
        let store = InMemoryOrderStore::new();
        let outcome = store
            .apply_status("ghost", OrderStatus::Completed, &[OrderStatus::Pending])
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::NotFound);
    }

    #[tokio::test]
    async fn attach_session_is_set_once() {
        let store = InMemoryOrderStore::new();
        store.create_if_absent(new_order("O-1")).await.unwrap();

        assert_eq!(
            store.attach_session("O-1", "session_a").await.unwrap(),
            ApplyOutcome::Updated
        );
        assert_eq!(
            store.attach_session("O-1", "session_b").await.unwrap(),
            ApplyOutcome::Conflict
        );

        let stored = store.get("O-1").await.unwrap().unwrap();
        assert_eq!(stored.payment_session_id.as_deref(), Some("session_a"));
    }

    #[tokio::test]
    async fn find_for_customer_requires_matching_key() {
        let store = InMemoryOrderStore::new();
        store.create_if_absent(new_order("O-1")).await.unwrap();

        assert!(store
            .find_for_customer("9612300001", "O-1")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_for_customer("0000000000", "O-1")
            .await
            .unwrap()
            .is_none());
    }
}
