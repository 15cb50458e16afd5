#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use rust_decimal_macros::dec;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use paygate_api::{
    config::{AppConfig, GatewayConfig},
    errors::ServiceError,
    events::EventSender,
    gateway::{
        signature, GatewayClient, GatewaySession, RemoteOrder, RemoteOrderStatus, SessionRequest,
    },
    services::AppServices,
    store::{InMemoryOrderStore, NewOrder, OrderStore},
    AppState,
};

/// Scripted gateway double: deterministic session ids, programmable remote
/// order state, and a record of every session it was asked to create.
pub struct FakeGateway {
    remote: Mutex<HashMap<String, RemoteOrder>>,
    created: Mutex<Vec<SessionRequest>>,
    counter: AtomicUsize,
    fail_creates_with_timeout: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            remote: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
            fail_creates_with_timeout: AtomicBool::new(false),
        }
    }

    /// Overrides the remote state for an order (e.g. to simulate the gateway
    /// expiring it behind our back).
    pub fn set_remote_status(&self, order_id: &str, status: RemoteOrderStatus) {
        let mut remote = self.remote.lock().unwrap();
        match remote.get_mut(order_id) {
            Some(entry) => entry.order_status = status,
            None => {
                remote.insert(
                    order_id.to_owned(),
                    RemoteOrder {
                        order_id: order_id.to_owned(),
                        order_status: status,
                        payment_session_id: None,
                    },
                );
            }
        }
    }

    /// Installs a complete remote order, session included.
    pub fn set_remote(&self, order_id: &str, status: RemoteOrderStatus, session: Option<&str>) {
        self.remote.lock().unwrap().insert(
            order_id.to_owned(),
            RemoteOrder {
                order_id: order_id.to_owned(),
                order_status: status,
                payment_session_id: session.map(str::to_owned),
            },
        );
    }

    pub fn forget_remote(&self, order_id: &str) {
        self.remote.lock().unwrap().remove(order_id);
    }

    pub fn fail_creates_with_timeout(&self, fail: bool) {
        self.fail_creates_with_timeout.store(fail, Ordering::SeqCst);
    }

    pub fn sessions_created(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn last_session_request(&self) -> Option<SessionRequest> {
        self.created.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl GatewayClient for FakeGateway {
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        if self.fail_creates_with_timeout.load(Ordering::SeqCst) {
            return Err(ServiceError::GatewayTimeout);
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let payment_session_id = format!("session_{n}");
        self.remote.lock().unwrap().insert(
            request.order_id.clone(),
            RemoteOrder {
                order_id: request.order_id.clone(),
                order_status: RemoteOrderStatus::Active,
                payment_session_id: Some(payment_session_id.clone()),
            },
        );
        self.created.lock().unwrap().push(request.clone());
        Ok(GatewaySession { payment_session_id })
    }

    async fn query_status(&self, order_id: &str) -> Result<RemoteOrder, ServiceError> {
        self.remote
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .ok_or(ServiceError::GatewayError {
                status: 404,
                message: "order not found".to_string(),
            })
    }
}

pub const TEST_CUSTOMER_PHONE: &str = "9612300001";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test";

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:",
        "127.0.0.1",
        18_080,
        "test",
        GatewayConfig::new("https://sandbox.gateway.test/pg", "app_test", "secret_test"),
        "https://shop.example/payment_response",
    );
    cfg.success_redirect = Some("image_screen".to_string());
    cfg
}

/// Application harness backed by the in-memory store and the scripted
/// gateway; requests go through the real router.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryOrderStore>,
    pub gateway: Arc<FakeGateway>,
    pub services: AppServices,
    pub config: AppConfig,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Harness with webhook signature verification switched on.
    pub fn with_webhook_secret() -> Self {
        let mut cfg = test_config();
        cfg.webhook_secret = Some(TEST_WEBHOOK_SECRET.to_string());
        Self::with_config(cfg)
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(InMemoryOrderStore::new());
        let gateway = Arc::new(FakeGateway::new());

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(paygate_api::events::process_events(event_rx));

        let services = AppServices::new(
            store.clone() as Arc<dyn OrderStore>,
            gateway.clone() as Arc<dyn GatewayClient>,
            event_sender.clone(),
            &config,
        );

        let state = AppState {
            config: config.clone(),
            services: services.clone(),
            event_sender,
        };

        Self {
            router: paygate_api::app(state),
            store,
            gateway,
            services,
            config,
            _event_task: event_task,
        }
    }

    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(path);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };
        self.router.clone().oneshot(request).await.expect("response")
    }

    pub async fn request_form(&self, path: &str, form_body: &str) -> Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form_body.to_string()))
            .expect("request");
        self.router.clone().oneshot(request).await.expect("response")
    }

    /// Posts a webhook with valid signature headers for `secret`.
    pub async fn request_signed_webhook(&self, body: &Value, secret: &str) -> Response {
        let raw = body.to_string();
        let ts = chrono::Utc::now().timestamp().to_string();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .header(signature::TIMESTAMP_HEADER, &ts)
            .header(
                signature::SIGNATURE_HEADER,
                signature::sign(secret, &ts, raw.as_bytes()),
            )
            .body(Body::from(raw))
            .expect("request");
        self.router.clone().oneshot(request).await.expect("response")
    }

    /// Seeds a pending order directly into the store, bypassing the gateway.
    pub async fn seed_order(&self, order_id: &str, session: Option<&str>) {
        self.store
            .create_if_absent(NewOrder {
                order_id: order_id.into(),
                amount: dec!(100),
                currency: "INR".into(),
                customer_id: "C-1".into(),
                customer_name: "Asha".into(),
                customer_email: "asha@example.com".into(),
                customer_phone: TEST_CUSTOMER_PHONE.into(),
                payment_session_id: session.map(str::to_owned),
                original_order_id: None,
            })
            .await
            .expect("seed order");
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Standard create_order payload for order `order_id`.
pub fn create_order_payload(order_id: &str) -> Value {
    serde_json::json!({
        "order_id": order_id,
        "order_amount": "100",
        "customer_name": "Asha",
        "customer_email": "asha@example.com",
        "customer_phone": TEST_CUSTOMER_PHONE,
    })
}
