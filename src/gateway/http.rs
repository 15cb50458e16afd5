use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tracing::{debug, instrument};
use url::Url;

use crate::config::AppConfig;
use crate::errors::ServiceError;

use super::{GatewayClient, GatewaySession, RemoteOrder, SessionRequest};

/// Reqwest-backed gateway adapter. One shared client, bounded timeout on
/// every call.
pub struct HttpGatewayClient {
    client: Client,
    base_url: String,
    app_id: String,
    secret_key: String,
    api_version: String,
    return_url_base: String,
    notify_url_base: Option<String>,
}

impl HttpGatewayClient {
    pub fn new(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.gateway.timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client init failed: {e}")))?;

        Ok(Self {
            client,
            base_url: cfg.gateway.base_url.trim_end_matches('/').to_string(),
            app_id: cfg.gateway.app_id.clone(),
            secret_key: cfg.gateway.secret_key.clone(),
            api_version: cfg.gateway.api_version.clone(),
            return_url_base: cfg.return_url_base.clone(),
            notify_url_base: cfg.notify_url_base.clone(),
        })
    }

    fn orders_url(&self) -> String {
        format!("{}/orders", self.base_url)
    }

    /// Redirect target the gateway sends the customer back to; the order id
    /// rides along as a query parameter.
    fn return_url(&self, order_id: &str) -> Result<String, ServiceError> {
        let mut url = Url::parse(&self.return_url_base)
            .map_err(|e| ServiceError::InternalError(format!("bad return_url_base: {e}")))?;
        url.query_pairs_mut().append_pair("order_id", order_id);
        Ok(url.into())
    }

    fn map_transport_error(err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::GatewayTimeout
        } else {
            ServiceError::GatewayError {
                status: 502,
                message: format!("gateway request failed: {err}"),
            }
        }
    }

    /// Pulls the gateway's error message out of a non-2xx response body.
    async fn error_from_response(response: Response) -> ServiceError {
        let status = response.status().as_u16();
        let message = match response.json::<Value>().await {
            Ok(body) => body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error occurred")
                .to_string(),
            Err(_) => "Unknown error occurred".to_string(),
        };
        ServiceError::GatewayError { status, message }
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        let mut order_meta = json!({
            "return_url": self.return_url(&request.order_id)?,
        });
        if let Some(notify_url) = &self.notify_url_base {
            order_meta["notify_url"] = Value::String(notify_url.clone());
        }

        let payload = json!({
            "order_id": request.order_id,
            "order_amount": request.amount,
            "order_currency": request.currency,
            "customer_details": {
                "customer_id": request.customer_id,
                "customer_name": request.customer_name,
                "customer_email": request.customer_email,
                "customer_phone": request.customer_phone,
            },
            "order_meta": order_meta,
        });

        debug!(order_id = %request.order_id, "creating gateway session");
        let response = self
            .client
            .post(self.orders_url())
            .header("x-client-id", &self.app_id)
            .header("x-client-secret", &self.secret_key)
            .header("x-api-version", &self.api_version)
            .json(&payload)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(Self::map_transport_error)?;
        match body.get("payment_session_id").and_then(Value::as_str) {
            Some(payment_session_id) if !payment_session_id.is_empty() => Ok(GatewaySession {
                payment_session_id: payment_session_id.to_string(),
            }),
            _ => Err(ServiceError::GatewayError {
                status: 502,
                message: "Payment session ID not found".to_string(),
            }),
        }
    }

    #[instrument(skip(self))]
    async fn query_status(&self, order_id: &str) -> Result<RemoteOrder, ServiceError> {
        let response = self
            .client
            .get(format!("{}/{}", self.orders_url(), order_id))
            .header("x-client-id", &self.app_id)
            .header("x-client-secret", &self.secret_key)
            .header("x-api-version", &self.api_version)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        response.json::<RemoteOrder>().await.map_err(|e| {
            // A status string outside the known vocabulary lands here too:
            // rejected rather than guessed at.
            ServiceError::GatewayError {
                status: 502,
                message: format!("unrecognized gateway order response: {e}"),
            }
        })
    }
}
