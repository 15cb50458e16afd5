//! HttpGatewayClient contract tests against a stubbed gateway server:
//! header/payload shape, error mapping, and timeout behavior.

use std::time::Duration;

use paygate_api::config::{AppConfig, GatewayConfig};
use paygate_api::errors::ServiceError;
use paygate_api::gateway::{GatewayClient, HttpGatewayClient, RemoteOrderStatus, SessionRequest};
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_config(server_uri: &str) -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:",
        "127.0.0.1",
        18_080,
        "test",
        GatewayConfig::new(format!("{server_uri}/pg"), "app_test", "secret_test"),
        "https://shop.example/payment_response",
    );
    cfg.gateway.timeout_secs = 1;
    cfg.notify_url_base = Some("https://shop.example/payment_notification".to_string());
    cfg
}

fn session_request(order_id: &str) -> SessionRequest {
    SessionRequest {
        order_id: order_id.into(),
        amount: dec!(100),
        currency: "INR".into(),
        customer_id: "C-1".into(),
        customer_name: "Asha".into(),
        customer_email: "asha@example.com".into(),
        customer_phone: "9612300001".into(),
    }
}

#[tokio::test]
async fn create_session_sends_credentials_and_callback_urls() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pg/orders"))
        .and(header("x-client-id", "app_test"))
        .and(header("x-client-secret", "secret_test"))
        .and(header("x-api-version", "2023-08-01"))
        .and(body_partial_json(json!({
            "order_id": "O-1",
            "order_currency": "INR",
            "customer_details": {
                "customer_id": "C-1",
                "customer_phone": "9612300001"
            },
            "order_meta": {
                "return_url": "https://shop.example/payment_response?order_id=O-1",
                "notify_url": "https://shop.example/payment_notification"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order_id": "O-1",
            "payment_session_id": "sess_abc123"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpGatewayClient::new(&client_config(&server.uri())).unwrap();
    let session = client.create_session(&session_request("O-1")).await.unwrap();
    assert_eq!(session.payment_session_id, "sess_abc123");
}

#[tokio::test]
async fn create_session_passes_gateway_errors_through() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pg/orders"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "Order already exists with this order_id"
        })))
        .mount(&server)
        .await;

    let client = HttpGatewayClient::new(&client_config(&server.uri())).unwrap();
    let err = client
        .create_session(&session_request("O-1"))
        .await
        .unwrap_err();

    match err {
        ServiceError::GatewayError { status, message } => {
            assert_eq!(status, 409);
            assert!(message.contains("already exists"));
        }
        other => panic!("expected GatewayError, got {other:?}"),
    }
}

#[tokio::test]
async fn create_session_without_a_session_id_is_a_gateway_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pg/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"order_id": "O-1"})))
        .mount(&server)
        .await;

    let client = HttpGatewayClient::new(&client_config(&server.uri())).unwrap();
    let err = client
        .create_session(&session_request("O-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::GatewayError { status: 502, .. }));
}

#[tokio::test]
async fn query_status_parses_the_remote_order() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pg/orders/O-1"))
        .and(header("x-client-id", "app_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order_id": "O-1",
            "order_status": "PAID",
            "payment_session_id": "sess_abc123"
        })))
        .mount(&server)
        .await;

    let client = HttpGatewayClient::new(&client_config(&server.uri())).unwrap();
    let remote = client.query_status("O-1").await.unwrap();
    assert_eq!(remote.order_status, RemoteOrderStatus::Paid);
    assert_eq!(remote.payment_session_id.as_deref(), Some("sess_abc123"));
}

#[tokio::test]
async fn query_status_rejects_unknown_remote_vocabulary() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pg/orders/O-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order_id": "O-1",
            "order_status": "HALF_PAID"
        })))
        .mount(&server)
        .await;

    let client = HttpGatewayClient::new(&client_config(&server.uri())).unwrap();
    let err = client.query_status("O-1").await.unwrap_err();
    assert!(matches!(err, ServiceError::GatewayError { status: 502, .. }));
}

#[tokio::test]
async fn query_status_maps_missing_orders_to_the_upstream_404() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pg/orders/ghost"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "Order not found"})),
        )
        .mount(&server)
        .await;

    let client = HttpGatewayClient::new(&client_config(&server.uri())).unwrap();
    let err = client.query_status("ghost").await.unwrap_err();
    assert!(matches!(err, ServiceError::GatewayError { status: 404, .. }));
}

#[tokio::test]
async fn slow_gateway_responses_surface_as_timeouts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pg/orders"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(1_500))
                .set_body_json(json!({"payment_session_id": "sess_late"})),
        )
        .mount(&server)
        .await;

    let client = HttpGatewayClient::new(&client_config(&server.uri())).unwrap();
    let err = client
        .create_session(&session_request("O-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::GatewayTimeout));
}
