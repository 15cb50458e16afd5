use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::services::reconciliation::{OrderStatus, SignalSource};

/// Order-lifecycle events published for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: String,
    },
    SessionAttached {
        order_id: String,
        payment_session_id: String,
    },
    OrderResumed {
        order_id: String,
        successor_of: Option<String>,
    },
    PaymentStatusChanged {
        order_id: String,
        new_status: OrderStatus,
        source: SignalSource,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Background consumer draining the event channel into the audit log.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated { order_id } => {
                info!(order_id = %order_id, "audit: order created");
            }
            Event::SessionAttached {
                order_id,
                payment_session_id,
            } => {
                info!(order_id = %order_id, payment_session_id = %payment_session_id, "audit: session attached");
            }
            Event::OrderResumed {
                order_id,
                successor_of,
            } => {
                info!(order_id = %order_id, successor_of = ?successor_of, "audit: order resumed");
            }
            Event::PaymentStatusChanged {
                order_id,
                new_status,
                source,
            } => {
                info!(order_id = %order_id, new_status = %new_status, source = %source, "audit: payment status changed");
            }
        }
    }
    info!("event channel closed; audit consumer exiting");
}
