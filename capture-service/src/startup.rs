//! Application startup and lifecycle management.

use crate::config::Config;
use crate::handlers;
use crate::services::{
    CaptureOrchestrator, PaymentProcessor, PaymentStore, RestStore, StripeClient,
};
use axum::{
    http::{Method, Request},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    cors::permissive_cors, metrics::metrics_middleware, tracing::request_id_middleware,
    tracing::REQUEST_ID_HEADER,
};
use service_core::retry::RetryConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: CaptureOrchestrator,
}

/// Build the HTTP router for the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route("/capture-payment", post(handlers::capture::capture_payment))
        .route(
            "/reconcile-capture",
            post(handlers::capture::reconcile_capture),
        )
        .layer(permissive_cors(&[Method::POST, Method::OPTIONS]))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application against the configured Stripe account and store.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let stripe = StripeClient::new(config.stripe.clone()).map_err(|e| {
            tracing::error!("Failed to create Stripe client: {}", e);
            AppError::ConfigError(e.into())
        })?;
        if !stripe.is_configured() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Stripe secret key is not configured"
            )));
        }
        tracing::info!("Stripe client initialized");

        let store = RestStore::new(config.store.clone()).map_err(|e| {
            tracing::error!("Failed to create store client: {}", e);
            AppError::ConfigError(e.into())
        })?;
        tracing::info!(store_url = %config.store.url, "Store client initialized");

        Self::build_with(config, Arc::new(stripe), Arc::new(store)).await
    }

    /// Build the application with explicit processor and store implementations.
    pub async fn build_with(
        config: Config,
        processor: Arc<dyn PaymentProcessor>,
        store: Arc<dyn PaymentStore>,
    ) -> Result<Self, AppError> {
        let orchestrator = CaptureOrchestrator::new(processor, store)
            .with_store_retry(RetryConfig::with_max_retries(
                config.capture.store_write_retries,
            ))
            .with_completed_guard(config.capture.guard_completed);

        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!(
                    "Invalid bind address {}:{}: {}",
                    config.server.host,
                    config.server.port,
                    e
                ))
            })?;

        // Port 0 binds a random port (used by tests)
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            guard_completed = config.capture.guard_completed,
            store_write_retries = config.capture.store_write_retries,
            "Capture service bound"
        );

        Ok(Self {
            port,
            listener,
            state: AppState { orchestrator },
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!("Listening on {}", self.listener.local_addr()?);
        axum::serve(self.listener, router(self.state)).await
    }
}
