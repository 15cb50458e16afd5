pub mod http;
pub mod signature;

pub use http::HttpGatewayClient;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::warn;

use crate::entities::order;
use crate::errors::ServiceError;
use crate::services::reconciliation::OrderStatus;

/// The gateway's own order-state vocabulary. Everything except `Active` is
/// terminal on the gateway side.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum RemoteOrderStatus {
    Active,
    Paid,
    Expired,
    Terminated,
}

impl RemoteOrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RemoteOrderStatus::Active)
    }

    /// Local equivalent of a terminal remote state; `None` while the gateway
    /// still reports the order in flight.
    pub fn as_local(self) -> Option<OrderStatus> {
        match self {
            RemoteOrderStatus::Active => None,
            RemoteOrderStatus::Paid => Some(OrderStatus::Completed),
            RemoteOrderStatus::Expired => Some(OrderStatus::Expired),
            RemoteOrderStatus::Terminated => Some(OrderStatus::Cancelled),
        }
    }
}

/// Everything the gateway needs to open a payment session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
}

impl SessionRequest {
    /// Builds a session request for re-issuing a session against an already
    /// persisted order record.
    pub fn from_order(record: &order::Model) -> Self {
        Self {
            order_id: record.order_id.clone(),
            amount: record.amount,
            currency: record.currency.clone(),
            customer_id: record.customer_id.clone(),
            customer_name: record.customer_name.clone(),
            customer_email: record.customer_email.clone(),
            customer_phone: record.customer_phone.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySession {
    pub payment_session_id: String,
}

/// Gateway-side view of an order, as returned by the status query.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteOrder {
    pub order_id: String,
    pub order_status: RemoteOrderStatus,
    pub payment_session_id: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Opens a payment session for an order. Pure remote call, no local
    /// side effects; non-2xx responses surface as `ServiceError::GatewayError`.
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<GatewaySession, ServiceError>;

    /// Fetches the gateway's authoritative state for an order identifier.
    async fn query_status(&self, order_id: &str) -> Result<RemoteOrder, ServiceError>;
}

/// `create_session` with the timeout follow-up pass: a timed-out create may
/// still have created the order remotely, so one status query runs before the
/// timeout is surfaced. A live remote session found that way is adopted.
pub async fn create_session_reconciled(
    client: &dyn GatewayClient,
    request: &SessionRequest,
) -> Result<GatewaySession, ServiceError> {
    match client.create_session(request).await {
        Ok(session) => Ok(session),
        Err(ServiceError::GatewayTimeout) => {
            warn!(
                order_id = %request.order_id,
                "session creation timed out; checking whether the gateway created it anyway"
            );
            match client.query_status(&request.order_id).await {
                Ok(remote) if !remote.order_status.is_terminal() => {
                    match remote.payment_session_id {
                        Some(payment_session_id) => Ok(GatewaySession { payment_session_id }),
                        None => Err(ServiceError::GatewayTimeout),
                    }
                }
                _ => Err(ServiceError::GatewayTimeout),
            }
        }
        Err(err) => Err(err),
    }
}
