pub mod orders;
pub mod payments;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

/// The service's HTTP surface. Paths kept stable for existing gateway and
/// client integrations.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create_order", post(orders::create_order))
        .route("/resume_payment", post(orders::resume_payment))
        .route("/payment_response", get(payments::payment_response))
        .route("/webhook", post(payments::webhook))
        .route("/payment_notification", post(payments::payment_notification))
}
