use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::entities::order;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{create_session_reconciled, GatewayClient, SessionRequest};
use crate::services::identity::{IdentityResolver, Resolution};
use crate::store::{ApplyOutcome, CreateOutcome, NewOrder, OrderStore};

/// A fresh identity can be stolen by a concurrent create between resolution
/// and insert; each loss re-enters resolution.
const MAX_CREATE_ATTEMPTS: u32 = 3;

const DEFAULT_CUSTOMER_ID: &str = "default_customer_id";

fn validate_positive_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("range");
        err.message = Some("Amount must be greater than 0".into());
        Err(err)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    /// Client-supplied identifier; a fresh UUID is minted when absent
    pub order_id: Option<String>,
    #[validate(custom = "validate_positive_decimal")]
    pub order_amount: Decimal,
    pub customer_id: Option<String>,
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    #[validate(length(min = 1, message = "Customer phone is required"))]
    pub customer_phone: String,
}

/// What every session-producing operation answers with.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderSessionResponse {
    pub order_id: String,
    pub payment_session_id: String,
}

/// Order-creation orchestration: resolve an identity, open a gateway
/// session, persist the record.
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn GatewayClient>,
    resolver: Arc<IdentityResolver>,
    events: EventSender,
    currency: String,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn GatewayClient>,
        resolver: Arc<IdentityResolver>,
        events: EventSender,
        currency: String,
    ) -> Self {
        Self {
            store,
            gateway,
            resolver,
            events,
            currency,
        }
    }

    #[instrument(skip(self, request), fields(requested_id = ?request.order_id))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderSessionResponse, ServiceError> {
        request.validate()?;

        let requested = request
            .order_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        for _ in 0..MAX_CREATE_ATTEMPTS {
            match self.resolver.resolve(&requested).await? {
                Resolution::Fresh { order_id } => {
                    match self.open_and_persist(&order_id, &request, None).await? {
                        Some(response) => return Ok(response),
                        None => continue,
                    }
                }
                Resolution::InFlight { order } => {
                    return self.reuse_or_heal(order).await;
                }
                Resolution::Minted { order_id, original } => {
                    match self
                        .open_and_persist(&order_id, &request, Some(original.order_id))
                        .await?
                    {
                        Some(response) => return Ok(response),
                        None => continue,
                    }
                }
            }
        }

        Err(ServiceError::Conflict(format!(
            "could not settle an identity for order {requested}"
        )))
    }

    /// Opens a gateway session for `order_id` and persists the record.
    /// Returns `None` when another writer claimed the identifier first.
    async fn open_and_persist(
        &self,
        order_id: &str,
        request: &CreateOrderRequest,
        original_order_id: Option<String>,
    ) -> Result<Option<OrderSessionResponse>, ServiceError> {
        let session_request = SessionRequest {
            order_id: order_id.to_owned(),
            amount: request.order_amount,
            currency: self.currency.clone(),
            customer_id: request
                .customer_id
                .clone()
                .unwrap_or_else(|| DEFAULT_CUSTOMER_ID.to_string()),
            customer_name: request.customer_name.clone(),
            customer_email: request.customer_email.clone(),
            customer_phone: request.customer_phone.clone(),
        };
        let session = create_session_reconciled(&*self.gateway, &session_request).await?;

        let new_order = NewOrder {
            order_id: order_id.to_owned(),
            amount: request.order_amount,
            currency: self.currency.clone(),
            customer_id: session_request.customer_id.clone(),
            customer_name: request.customer_name.clone(),
            customer_email: request.customer_email.clone(),
            customer_phone: request.customer_phone.clone(),
            payment_session_id: Some(session.payment_session_id.clone()),
            original_order_id,
        };

        match self.store.create_if_absent(new_order).await? {
            CreateOutcome::Created => {
                info!(order_id = %order_id, "order created");
                if let Err(e) = self
                    .events
                    .send(Event::OrderCreated {
                        order_id: order_id.to_owned(),
                    })
                    .await
                {
                    warn!(order_id = %order_id, error = %e, "failed to publish order created event");
                }
                Ok(Some(OrderSessionResponse {
                    order_id: order_id.to_owned(),
                    payment_session_id: session.payment_session_id,
                }))
            }
            CreateOutcome::AlreadyExists => {
                warn!(order_id = %order_id, "identifier claimed concurrently; re-resolving");
                Ok(None)
            }
        }
    }

    /// Idempotent retry against an in-flight order: hand back the stored
    /// session, or re-open one for the same identifier when an earlier
    /// failure left the row without a session token.
    async fn reuse_or_heal(
        &self,
        order: order::Model,
    ) -> Result<OrderSessionResponse, ServiceError> {
        if let Some(payment_session_id) = order.payment_session_id.clone() {
            info!(order_id = %order.order_id, "reusing existing pending session");
            return Ok(OrderSessionResponse {
                order_id: order.order_id,
                payment_session_id,
            });
        }

        let session_request = SessionRequest::from_order(&order);
        let session = create_session_reconciled(&*self.gateway, &session_request).await?;

        match self
            .store
            .attach_session(&order.order_id, &session.payment_session_id)
            .await?
        {
            ApplyOutcome::Updated => {
                if let Err(e) = self
                    .events
                    .send(Event::SessionAttached {
                        order_id: order.order_id.clone(),
                        payment_session_id: session.payment_session_id.clone(),
                    })
                    .await
                {
                    warn!(order_id = %order.order_id, error = %e, "failed to publish session attached event");
                }
                Ok(OrderSessionResponse {
                    order_id: order.order_id,
                    payment_session_id: session.payment_session_id,
                })
            }
            ApplyOutcome::Conflict => {
                // Lost the attach race; whatever session won is the answer.
                let current = self.store.get(&order.order_id).await?.ok_or_else(|| {
                    ServiceError::NotFound(format!("Order {} not found", order.order_id))
                })?;
                current
                    .payment_session_id
                    .map(|payment_session_id| OrderSessionResponse {
                        order_id: order.order_id,
                        payment_session_id,
                    })
                    .ok_or_else(|| {
                        ServiceError::InternalError(
                            "session attach conflicted but no session is stored".to_string(),
                        )
                    })
            }
            ApplyOutcome::NotFound => Err(ServiceError::NotFound(format!(
                "Order {} not found",
                order.order_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(amount: Decimal) -> CreateOrderRequest {
        CreateOrderRequest {
            order_id: Some("O-1".into()),
            order_amount: amount,
            customer_id: None,
            customer_name: "Asha".into(),
            customer_email: "asha@example.com".into(),
            customer_phone: "9612300001".into(),
        }
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert!(request(dec!(0)).validate().is_err());
        assert!(request(dec!(-5)).validate().is_err());
        assert!(request(dec!(0.01)).validate().is_ok());
    }

    #[test]
    fn rejects_malformed_customer_fields() {
        let mut req = request(dec!(100));
        req.customer_email = "not-an-email".into();
        assert!(req.validate().is_err());

        let mut req = request(dec!(100));
        req.customer_name.clear();
        assert!(req.validate().is_err());
    }
}
