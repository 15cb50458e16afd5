use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, instrument};

use crate::entities::order;
use crate::errors::ServiceError;
use crate::gateway::GatewayClient;
use crate::services::reconciliation::OrderStatus;
use crate::store::OrderStore;

static RETRY_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_retry_(\d+)$").expect("retry suffix pattern"));

/// Upper bound on successor probing; hitting it means the store is feeding
/// back impossible collisions.
const MAX_MINT_PROBES: u32 = 1000;

/// How a requested order identifier resolves against local and gateway state.
#[derive(Debug)]
pub enum Resolution {
    /// No local record: the identifier can be used as-is for a new root order.
    Fresh { order_id: String },
    /// A local record exists and is (per gateway truth, when consulted) still
    /// in flight: reuse it instead of creating a second gateway order.
    InFlight { order: order::Model },
    /// The identifier is terminally consumed: `order_id` is the minted
    /// successor to use for the next session.
    Minted {
        order_id: String,
        original: order::Model,
    },
}

/// Decides the identifier to actually use for a new gateway session.
///
/// One rule, applied everywhere: never mint a new identity while a session is
/// non-terminal; always mint one before re-using a terminally consumed
/// identifier.
pub struct IdentityResolver {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn GatewayClient>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn OrderStore>, gateway: Arc<dyn GatewayClient>) -> Self {
        Self { store, gateway }
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, requested: &str) -> Result<Resolution, ServiceError> {
        let Some(existing) = self.store.get(requested).await? else {
            return Ok(Resolution::Fresh {
                order_id: requested.to_owned(),
            });
        };

        if existing.order_status()? == OrderStatus::Pending {
            return Ok(Resolution::InFlight { order: existing });
        }

        // Local state is terminal. Double-check against gateway truth before
        // burning a new identifier: the local record may be stale.
        match self.gateway.query_status(requested).await {
            Ok(remote) if !remote.order_status.is_terminal() => {
                info!(order_id = %requested, "gateway still reports the order in flight; reusing it");
                Ok(Resolution::InFlight { order: existing })
            }
            Ok(_) => {
                let order_id = self.mint_successor(&existing).await?;
                Ok(Resolution::Minted {
                    order_id,
                    original: existing,
                })
            }
            Err(ServiceError::GatewayError { status: 404, .. }) => {
                // Locally terminal and unknown remotely: consumed either way.
                let order_id = self.mint_successor(&existing).await?;
                Ok(Resolution::Minted {
                    order_id,
                    original: existing,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Derives the next free `<root>_retry_<n>` identifier for a consumed
    /// order. The suffix is stripped from the prior id first, so successors
    /// of successors do not chain suffixes; probing starts just past the
    /// prior counter to keep the sequence monotonic.
    pub async fn mint_successor(&self, original: &order::Model) -> Result<String, ServiceError> {
        let (root, prior) = match RETRY_SUFFIX.captures(&original.order_id) {
            Some(caps) => {
                let n = caps[1].parse::<u32>().unwrap_or(0);
                (RETRY_SUFFIX.replace(&original.order_id, "").into_owned(), n)
            }
            None => (original.order_id.clone(), 0),
        };

        let mut n = prior + 1;
        while n <= prior + MAX_MINT_PROBES {
            let candidate = format!("{root}_retry_{n}");
            if self.store.get(&candidate).await?.is_none() {
                info!(original = %original.order_id, successor = %candidate, "minted successor order id");
                return Ok(candidate);
            }
            n += 1;
        }
        Err(ServiceError::InternalError(format!(
            "could not mint a successor for order {}",
            original.order_id
        )))
    }
}
