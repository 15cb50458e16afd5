use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::entities::order;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{create_session_reconciled, GatewayClient, SessionRequest};
use crate::services::identity::IdentityResolver;
use crate::services::orders::OrderSessionResponse;
use crate::services::reconciliation::{ReconciliationEngine, SignalSource};
use crate::store::{ApplyOutcome, CreateOutcome, NewOrder, OrderStore};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ResumeRequest {
    #[validate(length(min = 1, message = "Order ID is required"))]
    pub order_id: String,
    /// The customer's stable key (mobile number); scopes the lookup so one
    /// customer cannot resume another's order.
    #[validate(length(min = 1, message = "Customer key is required"))]
    pub customer_key: String,
    /// Replacement amount for a freshly minted successor; ignored when the
    /// existing session is reused or re-issued.
    pub order_amount: Option<Decimal>,
}

/// Re-enters the payment flow for an order that never reached a terminal
/// state locally — or mints a successor when the gateway says it did.
pub struct ResumeCoordinator {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn GatewayClient>,
    resolver: Arc<IdentityResolver>,
    engine: Arc<ReconciliationEngine>,
    events: EventSender,
}

impl ResumeCoordinator {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn GatewayClient>,
        resolver: Arc<IdentityResolver>,
        engine: Arc<ReconciliationEngine>,
        events: EventSender,
    ) -> Self {
        Self {
            store,
            gateway,
            resolver,
            engine,
            events,
        }
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn resume(
        &self,
        request: ResumeRequest,
    ) -> Result<OrderSessionResponse, ServiceError> {
        request.validate()?;

        let order = self
            .store
            .find_for_customer(&request.customer_key, &request.order_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Order {} not found for customer",
                    request.order_id
                ))
            })?;

        let local_status = order.order_status()?;

        // Idempotent resume: a pending order with a live session is returned
        // unchanged.
        if !local_status.is_terminal() {
            if let Some(payment_session_id) = order.payment_session_id.clone() {
                info!(order_id = %order.order_id, "resume reuses the existing session");
                return Ok(OrderSessionResponse {
                    order_id: order.order_id,
                    payment_session_id,
                });
            }
        }

        match self.gateway.query_status(&order.order_id).await {
            Ok(remote) if remote.order_status.is_terminal() => {
                // Record gateway truth (a no-op when already settled), then
                // mint a successor for the next attempt.
                if let Some(local) = remote.order_status.as_local() {
                    self.engine
                        .apply(&order.order_id, local, SignalSource::Verification)
                        .await?;
                }
                self.reissue_with_new_identity(&order, request.order_amount)
                    .await
            }
            Ok(remote) => {
                // Still pending at the gateway: heal the local record without
                // inflating identity churn.
                self.heal_session(&order, remote.payment_session_id).await
            }
            Err(ServiceError::GatewayError { status: 404, .. }) => {
                if local_status.is_terminal() {
                    // Consumed locally and unknown remotely; the identifier
                    // cannot carry another session.
                    self.reissue_with_new_identity(&order, request.order_amount)
                        .await
                } else {
                    // The gateway never saw this order (a failed create left
                    // only the local row): open a session for the same id.
                    self.heal_session(&order, None).await
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Mints a successor identifier, opens a session for it, and persists the
    /// derived record with the back-reference to the consumed order.
    async fn reissue_with_new_identity(
        &self,
        original: &order::Model,
        amount_override: Option<Decimal>,
    ) -> Result<OrderSessionResponse, ServiceError> {
        let successor_id = self.resolver.mint_successor(original).await?;
        let amount = amount_override.unwrap_or(original.amount);

        let session_request = SessionRequest {
            order_id: successor_id.clone(),
            amount,
            currency: original.currency.clone(),
            customer_id: original.customer_id.clone(),
            customer_name: original.customer_name.clone(),
            customer_email: original.customer_email.clone(),
            customer_phone: original.customer_phone.clone(),
        };
        let session = create_session_reconciled(&*self.gateway, &session_request).await?;

        let new_order = NewOrder {
            order_id: successor_id.clone(),
            amount,
            currency: original.currency.clone(),
            customer_id: original.customer_id.clone(),
            customer_name: original.customer_name.clone(),
            customer_email: original.customer_email.clone(),
            customer_phone: original.customer_phone.clone(),
            payment_session_id: Some(session.payment_session_id.clone()),
            original_order_id: Some(original.order_id.clone()),
        };

        match self.store.create_if_absent(new_order).await? {
            CreateOutcome::Created => {
                info!(
                    order_id = %successor_id,
                    original = %original.order_id,
                    "order resumed under a new identity"
                );
                if let Err(e) = self
                    .events
                    .send(Event::OrderResumed {
                        order_id: successor_id.clone(),
                        successor_of: Some(original.order_id.clone()),
                    })
                    .await
                {
                    warn!(order_id = %successor_id, error = %e, "failed to publish resume event");
                }
                Ok(OrderSessionResponse {
                    order_id: successor_id,
                    payment_session_id: session.payment_session_id,
                })
            }
            CreateOutcome::AlreadyExists => {
                // A concurrent resume minted the same successor first; its
                // session stands.
                let winner = self.store.get(&successor_id).await?.ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "successor {successor_id} vanished after a create conflict"
                    ))
                })?;
                winner
                    .payment_session_id
                    .map(|payment_session_id| OrderSessionResponse {
                        order_id: successor_id.clone(),
                        payment_session_id,
                    })
                    .ok_or_else(|| {
                        ServiceError::Conflict(format!(
                            "successor {successor_id} exists without a session; retry the resume"
                        ))
                    })
            }
        }
    }

    /// Self-heals a partial write: reuse the stored session when present,
    /// adopt the one the gateway already issued, or open a new one for the
    /// same identifier. Never mints.
    async fn heal_session(
        &self,
        order: &order::Model,
        remote_session: Option<String>,
    ) -> Result<OrderSessionResponse, ServiceError> {
        if let Some(payment_session_id) = order.payment_session_id.clone() {
            // Gateway truth says in flight; the stored session is still good
            // even when the local status had gone terminal.
            return Ok(OrderSessionResponse {
                order_id: order.order_id.clone(),
                payment_session_id,
            });
        }

        let payment_session_id = match remote_session {
            Some(session_id) => session_id,
            None => {
                create_session_reconciled(&*self.gateway, &SessionRequest::from_order(order))
                    .await?
                    .payment_session_id
            }
        };

        match self
            .store
            .attach_session(&order.order_id, &payment_session_id)
            .await?
        {
            ApplyOutcome::Updated => {
                info!(order_id = %order.order_id, "healed order record with a session");
                if let Err(e) = self
                    .events
                    .send(Event::SessionAttached {
                        order_id: order.order_id.clone(),
                        payment_session_id: payment_session_id.clone(),
                    })
                    .await
                {
                    warn!(order_id = %order.order_id, error = %e, "failed to publish session attached event");
                }
                Ok(OrderSessionResponse {
                    order_id: order.order_id.clone(),
                    payment_session_id,
                })
            }
            ApplyOutcome::Conflict => {
                let current = self.store.get(&order.order_id).await?.ok_or_else(|| {
                    ServiceError::NotFound(format!("Order {} not found", order.order_id))
                })?;
                current
                    .payment_session_id
                    .map(|payment_session_id| OrderSessionResponse {
                        order_id: order.order_id.clone(),
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
