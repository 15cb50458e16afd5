use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::ErrorResponse;
use crate::handlers::payments::{NotificationPayload, VerificationResponse};
use crate::services::orders::{CreateOrderRequest, OrderSessionResponse};
use crate::services::reconciliation::OrderStatus;
use crate::services::resume::ResumeRequest;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "paygate-api",
        description = "Payment order backend: gateway sessions and monotonic status reconciliation"
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::resume_payment,
        crate::handlers::payments::payment_response,
        crate::handlers::payments::webhook,
        crate::handlers::payments::payment_notification,
    ),
    components(schemas(
        CreateOrderRequest,
        OrderSessionResponse,
        ResumeRequest,
        VerificationResponse,
        NotificationPayload,
        OrderStatus,
        ErrorResponse,
    )),
    tags(
        (name = "Orders", description = "Order creation and resume"),
        (name = "Payments", description = "Status signals and verification")
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
