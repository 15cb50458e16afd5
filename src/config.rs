use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "INR";
const DEFAULT_GATEWAY_API_VERSION: &str = "2023-08-01";
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Payment gateway connection settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Gateway API base URL, e.g. https://api.gateway.example/pg
    #[validate(custom = "validate_http_url")]
    pub base_url: String,

    /// Client id issued by the gateway
    #[validate(length(min = 1))]
    pub app_id: String,

    /// Client secret issued by the gateway
    #[validate(length(min = 1))]
    pub secret_key: String,

    /// Gateway API version header value
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Overall per-request timeout for gateway calls
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn new(
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            app_id: app_id.into(),
            secret_key: secret_key.into(),
            api_version: default_api_version(),
            timeout_secs: default_gateway_timeout(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// The single currency code every order is charged in
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    /// Payment gateway settings
    #[validate]
    pub gateway: GatewayConfig,

    /// Base URL the gateway redirects the customer back to after checkout
    #[validate(custom = "validate_http_url")]
    pub return_url_base: String,

    /// URL for the gateway's server-to-server notifications; unset disables
    /// the notify callback in session requests
    pub notify_url_base: Option<String>,

    /// HMAC secret for webhook signatures; unset skips verification
    pub webhook_secret: Option<String>,

    /// Maximum accepted webhook timestamp skew
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: u64,

    /// Client-side screen to redirect to after a verified payment
    pub success_redirect: Option<String>,

    /// Comma-separated allowed CORS origins
    pub cors_allowed_origins: Option<String>,

    /// Maximum number of database connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Minimum number of database connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
}

impl AppConfig {
    /// Minimal constructor used by tests and embedded setups; everything not
    /// named takes its serde default.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        database_url: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        environment: impl Into<String>,
        gateway: GatewayConfig,
        return_url_base: impl Into<String>,
    ) -> Self {
        Self {
            database_url: database_url.into(),
            host: host.into(),
            port,
            environment: environment.into(),
            log_level: default_log_level(),
            log_json: false,
            currency: default_currency(),
            gateway,
            return_url_base: return_url_base.into(),
            notify_url_base: None,
            webhook_secret: None,
            webhook_tolerance_secs: default_webhook_tolerance(),
            success_redirect: None,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development") || self.environment.eq_ignore_ascii_case("test")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_api_version() -> String {
    DEFAULT_GATEWAY_API_VERSION.to_string()
}

fn default_gateway_timeout() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}

fn default_webhook_tolerance() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn validate_http_url(value: &str) -> Result<(), ValidationError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        let mut err = ValidationError::new("url");
        err.message = Some("must be an http(s) URL".into());
        Err(err)
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured
/// level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("paygate_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // NOTE: gateway credentials and callback bases have no defaults - they
    // MUST be provided via environment variables or config files.
    let builder = Config::builder()
        .set_default("database_url", "sqlite://paygate.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // Check for gateway credentials before deserialization to provide a clear
    // error message.
    if config.get_string("gateway.secret_key").is_err() {
        error!("Gateway credentials are not configured. Set APP__GATEWAY__APP_ID and APP__GATEWAY__SECRET_KEY.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "gateway.secret_key is required but not configured. Set APP__GATEWAY__SECRET_KEY."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_gateway() -> GatewayConfig {
        GatewayConfig::new("https://sandbox.gateway.test/pg", "app_1", "secret_1")
    }

    #[test]
    fn minimal_config_validates() {
        let cfg = AppConfig::new(
            "sqlite::memory:",
            "127.0.0.1",
            8080,
            "test",
            test_gateway(),
            "https://shop.example/payment_response",
        );
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.currency, "INR");
        assert!(cfg.is_development());
    }

    #[test]
    fn rejects_non_http_urls() {
        let mut cfg = AppConfig::new(
            "sqlite::memory:",
            "127.0.0.1",
            8080,
            "test",
            test_gateway(),
            "ftp://shop.example/payment_response",
        );
        assert!(cfg.validate().is_err());

        cfg.return_url_base = "https://shop.example/payment_response".into();
        cfg.gateway.base_url = "not-a-url".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_malformed_currency() {
        let mut cfg = AppConfig::new(
            "sqlite::memory:",
            "127.0.0.1",
            8080,
            "test",
            test_gateway(),
            "https://shop.example/payment_response",
        );
        cfg.currency = "RUPEES".into();
        assert!(cfg.validate().is_err());
    }
}
