use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Form, Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;
use utoipa::{IntoParams, ToSchema};

use crate::errors::ServiceError;
use crate::gateway::signature;
use crate::services::reconciliation::{map_signal_status, SignalSource, VerificationOutcome};
use crate::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct PaymentResponseParams {
    pub order_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerificationResponse {
    pub message: String,
    pub order_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

/// GET /payment_response
///
/// Synchronous verification, hit when the gateway redirects the customer
/// back. A non-paid gateway state is a normal `failed` outcome, not an error.
#[utoipa::path(
    get,
    path = "/payment_response",
    params(PaymentResponseParams),
    responses(
        (status = 200, description = "Verification outcome", body = VerificationResponse),
        (status = 404, description = "Order unknown", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_response(
    State(state): State<AppState>,
    Query(params): Query<PaymentResponseParams>,
) -> Result<impl IntoResponse, ServiceError> {
    if params.order_id.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "Order ID is required".to_string(),
        ));
    }

    let outcome = state
        .services
        .reconciliation
        .verify(&params.order_id)
        .await?;

    let body = match outcome {
        VerificationOutcome::Verified => VerificationResponse {
            message: "Payment verified".to_string(),
            order_id: params.order_id,
            status: "success".to_string(),
            redirect_url: state.config.success_redirect.clone(),
        },
        VerificationOutcome::Failed { .. } => VerificationResponse {
            message: "Payment verification failed".to_string(),
            order_id: params.order_id,
            status: "failed".to_string(),
            redirect_url: None,
        },
    };
    Ok(Json(body))
}

/// POST /webhook
///
/// Gateway-signed status push. Signature verification runs when a secret is
/// configured; the payload then goes through the same mapping and guard as
/// every other status source.
#[utoipa::path(
    post,
    path = "/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Signal accepted (or already settled)"),
        (status = 400, description = "Malformed or unmapped payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    if let Some(secret) = state.config.webhook_secret.as_deref() {
        if !signature::verify_signature(
            &headers,
            &body,
            secret,
            state.config.webhook_tolerance_secs,
        ) {
            warn!("webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid json: {e}")))?;
    let (order_id, raw_status) = extract_signal(&payload)?;
    let status = map_signal_status(&raw_status)?;

    state
        .services
        .reconciliation
        .apply(&order_id, status, SignalSource::Webhook)
        .await?;

    Ok(Json(json!({"status": "success"})))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NotificationPayload {
    pub order_id: String,
    pub order_status: String,
}

/// POST /payment_notification
///
/// Legacy best-effort path: form-encoded, never signed. Low trust buys it no
/// shortcut — the identical vocabulary and conditional-update guard apply,
/// so it can never regress a status the webhook already advanced.
#[utoipa::path(
    post,
    path = "/payment_notification",
    responses(
        (status = 200, description = "Signal accepted (or already settled)"),
        (status = 400, description = "Unmapped status code", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_notification(
    State(state): State<AppState>,
    Form(payload): Form<NotificationPayload>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = map_signal_status(&payload.order_status)?;

    state
        .services
        .reconciliation
        .apply(&payload.order_id, status, SignalSource::Notification)
        .await?;

    Ok(Json(json!({"status": "success"})))
}

/// Pulls the order id and status string out of a webhook payload. The
/// current gateway payload nests them under `data`; the flat shape predates
/// that and is still produced by older gateway configurations.
fn extract_signal(payload: &Value) -> Result<(String, String), ServiceError> {
    let order_id = payload
        .pointer("/data/order/order_id")
        .or_else(|| payload.get("order_id"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            ServiceError::ValidationError("order_id missing from webhook payload".to_string())
        })?;

    let status = payload
        .pointer("/data/payment/payment_status")
        .or_else(|| payload.get("order_status"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ServiceError::ValidationError("payment status missing from webhook payload".to_string())
        })?;

    Ok((order_id.to_owned(), status.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_nested_payloads() {
        let payload = json!({
            "type": "PAYMENT_SUCCESS_WEBHOOK",
            "data": {
                "order": { "order_id": "O-9" },
                "payment": { "payment_status": "SUCCESS" }
            }
        });
        let (order_id, status) = extract_signal(&payload).unwrap();
        assert_eq!(order_id, "O-9");
        assert_eq!(status, "SUCCESS");
    }

    #[test]
    fn extracts_flat_payloads() {
        let payload = json!({"order_id": "O-9", "order_status": "EXPIRED"});
        let (order_id, status) = extract_signal(&payload).unwrap();
        assert_eq!(order_id, "O-9");
        assert_eq!(status, "EXPIRED");
    }

    #[test]
    fn missing_fields_are_validation_errors() {
        let payload = json!({"order_status": "SUCCESS"});
        assert!(matches!(
            extract_signal(&payload),
            Err(ServiceError::ValidationError(_))
        ));

        let payload = json!({"order_id": "O-9"});
        assert!(matches!(
            extract_signal(&payload),
            Err(ServiceError::ValidationError(_))
        ));
    }
}
