//! Process configuration, read once from the environment at startup.

use dotenvy::dotenv;
use secrecy::Secret;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub stripe: StripeConfig,
    pub capture: CaptureConfig,
    pub observability: ObservabilityConfig,
    pub service_name: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// REST endpoint of the managed database holding `payments` and `bookings`.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub url: String,
    pub service_key: Secret<String>,
    pub payments_table: String,
    pub bookings_table: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    pub api_base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// Refuse to capture when the local payment row is missing or already
    /// completed.
    pub guard_completed: bool,
    /// Retries for each store write after a successful capture.
    pub store_write_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl StripeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn required(name: &str) -> Result<String, AppError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("{} must be set", name)))
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", name, raw))
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let host = env::var("CAPTURE_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parsed("CAPTURE_SERVICE_PORT", 3010u16)?;
        let http_timeout = parsed("HTTP_CLIENT_TIMEOUT_SECS", 30u64)?;

        Ok(Self {
            server: ServerConfig { host, port },
            store: StoreConfig {
                url: required("SUPABASE_URL")?.trim_end_matches('/').to_string(),
                service_key: Secret::new(required("SUPABASE_SERVICE_ROLE_KEY")?),
                payments_table: env::var("CAPTURE_PAYMENTS_TABLE")
                    .unwrap_or_else(|_| "payments".to_string()),
                bookings_table: env::var("CAPTURE_BOOKINGS_TABLE")
                    .unwrap_or_else(|_| "bookings".to_string()),
                timeout_secs: http_timeout,
            },
            stripe: StripeConfig {
                secret_key: Secret::new(required("STRIPE_SECRET_KEY")?),
                api_base_url: env::var("STRIPE_API_BASE_URL")
                    .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                timeout_secs: http_timeout,
            },
            capture: CaptureConfig {
                guard_completed: parsed("CAPTURE_GUARD_COMPLETED", false)?,
                store_write_retries: parsed("CAPTURE_STORE_WRITE_RETRIES", 3u32)?,
            },
            observability: ObservabilityConfig {
                log_level: env::var("LOG_LEVEL")
                    .unwrap_or_else(|_| "info,capture_service=debug".to_string()),
                otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            },
            service_name: "capture-service".to_string(),
        })
    }
}
