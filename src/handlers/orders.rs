use axum::{extract::State, response::IntoResponse, Json};

use crate::errors::ServiceError;
use crate::services::orders::CreateOrderRequest;
use crate::services::resume::ResumeRequest;
use crate::AppState;

/// POST /create_order
///
/// Resolves an order identity, opens a gateway payment session and persists
/// the pending record. Retrying with the identifier of an in-flight order
/// returns its existing session instead of charging twice.
#[utoipa::path(
    post,
    path = "/create_order",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Session created or reused", body = crate::services::orders::OrderSessionResponse),
        (status = 400, description = "Missing or malformed field", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state.services.orders.create_order(payload).await?;
    Ok(Json(response))
}

/// POST /resume_payment
///
/// Re-enters the payment flow for an interrupted order; mints a derived
/// identifier when the original is terminally consumed at the gateway.
#[utoipa::path(
    post,
    path = "/resume_payment",
    request_body = ResumeRequest,
    responses(
        (status = 200, description = "Session to continue with", body = crate::services::orders::OrderSessionResponse),
        (status = 404, description = "Order or customer unknown", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn resume_payment(
    State(state): State<AppState>,
    Json(payload): Json<ResumeRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state.services.resume.resume(payload).await?;
    Ok(Json(response))
}
