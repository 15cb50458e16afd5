use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{GatewayClient, RemoteOrderStatus};
use crate::store::{ApplyOutcome, OrderStore};

/// Order payment status. `Pending` is the only non-terminal state; every
/// transition out of it is final.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

/// Where a status signal came from. Every source shares one vocabulary and
/// one conditional-update guard; the distinction is carried for audit logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Verification,
    Webhook,
    Notification,
}

/// Result of applying one status signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    Applied,
    /// The order already carries a terminal status. Duplicate and late
    /// signals land here; automated callers report success to stop redelivery.
    AlreadySettled,
}

/// Outcome of the synchronous verification path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    /// The gateway does not (yet) report the order as paid. A legitimate
    /// pending/failed result, not an error.
    Failed { remote_status: RemoteOrderStatus },
}

/// Maps the gateway's webhook/notification vocabulary onto the state machine.
/// Unrecognized codes are rejected rather than stored, so unmapped vendor
/// vocabulary can never corrupt the record.
pub fn map_signal_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "SUCCESS" => Ok(OrderStatus::Completed),
        "USER_DROPPED" | "CANCELLED" => Ok(OrderStatus::Cancelled),
        "EXPIRED" => Ok(OrderStatus::Expired),
        other => Err(ServiceError::ValidationError(format!(
            "unrecognized payment status '{other}'"
        ))),
    }
}

/// The single choke point allowed to advance a stored order status.
///
/// Correctness under reordering and duplication comes entirely from the
/// store's conditional update: every producer races against the same
/// `expected_prior = [Pending]` guard.
pub struct ReconciliationEngine {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn GatewayClient>,
    events: EventSender,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn GatewayClient>,
        events: EventSender,
    ) -> Self {
        Self {
            store,
            gateway,
            events,
        }
    }

    /// Applies one terminal status signal to an order.
    #[instrument(skip(self), fields(new_status = %new_status, source = %source))]
    pub async fn apply(
        &self,
        order_id: &str,
        new_status: OrderStatus,
        source: SignalSource,
    ) -> Result<ApplyResult, ServiceError> {
        if !new_status.is_terminal() {
            return Err(ServiceError::ValidationError(
                "a status signal cannot move an order back to pending".to_string(),
            ));
        }

        match self
            .store
            .apply_status(order_id, new_status, &[OrderStatus::Pending])
            .await?
        {
            ApplyOutcome::Updated => {
                info!(order_id = %order_id, new_status = %new_status, source = %source, "order status advanced");
                if let Err(e) = self
                    .events
                    .send(Event::PaymentStatusChanged {
                        order_id: order_id.to_owned(),
                        new_status,
                        source,
                    })
                    .await
                {
                    warn!(order_id = %order_id, error = %e, "failed to publish status change event");
                }
                Ok(ApplyResult::Applied)
            }
            ApplyOutcome::Conflict => {
                info!(order_id = %order_id, source = %source, "order already settled; duplicate or late signal");
                Ok(ApplyResult::AlreadySettled)
            }
            ApplyOutcome::NotFound => Err(ServiceError::NotFound(format!(
                "Order {order_id} not found"
            ))),
        }
    }

    /// Synchronous verification, run when the customer is redirected back
    /// from checkout. Only a remote `PAID` advances the record; anything else
    /// is reported as a failed verification with the store untouched.
    #[instrument(skip(self))]
    pub async fn verify(&self, order_id: &str) -> Result<VerificationOutcome, ServiceError> {
        self.store
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let remote = self.gateway.query_status(order_id).await?;
        match remote.order_status {
            RemoteOrderStatus::Paid => {
                self.apply(order_id, OrderStatus::Completed, SignalSource::Verification)
                    .await?;
                Ok(VerificationOutcome::Verified)
            }
            remote_status => Ok(VerificationOutcome::Failed { remote_status }),
        }
    }
}
