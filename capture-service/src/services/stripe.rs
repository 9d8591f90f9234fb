//! Stripe payment processor client.
//!
//! Implements the PaymentIntents capture and retrieve calls over Stripe's
//! REST API with the account's secret key.

use crate::config::StripeConfig;
use crate::services::processor::{PaymentIntent, PaymentProcessor, ProcessorError};
use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::instrument;

const IDEMPOTENT_REPLAYED_HEADER: &str = "idempotent-replayed";

/// Stripe client for interacting with the PaymentIntents API.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

/// Stripe API error response.
#[derive(Debug, Deserialize)]
pub struct StripeError {
    pub error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct StripeErrorDetail {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl StripeClient {
    /// Create a new Stripe client.
    pub fn new(config: StripeConfig) -> Result<Self, ProcessorError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Check if Stripe is configured (secret key is set).
    pub fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
    }

    fn intent_url(&self, payment_intent_id: &str) -> String {
        format!(
            "{}/payment_intents/{}",
            self.config.api_base_url,
            urlencoding::encode(payment_intent_id)
        )
    }

    async fn read_intent(
        &self,
        response: Response,
        operation: &str,
    ) -> Result<PaymentIntent, ProcessorError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;

        tracing::debug!(status = %status, operation, "Stripe response");

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| ProcessorError::Decode(e.to_string()));
        }

        let detail = serde_json::from_str::<StripeError>(&body)
            .map(|e| e.error)
            .unwrap_or(StripeErrorDetail {
                kind: None,
                code: None,
                message: Some(body.clone()),
            });

        tracing::error!(
            status = status.as_u16(),
            error_type = ?detail.kind,
            code = ?detail.code,
            operation,
            "Stripe request failed"
        );

        Err(ProcessorError::Rejected {
            status: status.as_u16(),
            code: detail.code,
            message: detail.message.unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            }),
        })
    }
}

/// Whether Stripe answered from its idempotency cache.
fn is_replayed(response: &Response) -> bool {
    response
        .headers()
        .get(IDEMPOTENT_REPLAYED_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    #[instrument(skip(self), fields(processor = "stripe"))]
    async fn capture(&self, payment_intent_id: &str) -> Result<PaymentIntent, ProcessorError> {
        if !self.is_configured() {
            return Err(ProcessorError::NotConfigured);
        }

        let response = self
            .client
            .post(format!("{}/capture", self.intent_url(payment_intent_id)))
            .bearer_auth(self.config.secret_key.expose_secret())
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .send()
            .await
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;

        // A replayed response describes an earlier capture, not this one
        if is_replayed(&response) {
            tracing::warn!(payment_intent_id, "Stripe replayed an earlier capture response");
            return Err(ProcessorError::AlreadyCaptured(payment_intent_id.to_string()));
        }

        let intent = self.read_intent(response, "capture").await?;

        tracing::info!(
            payment_intent_id = %intent.id,
            status = intent.status.as_str(),
            amount_received = ?intent.amount_received,
            "Stripe payment intent captured"
        );

        Ok(intent)
    }

    #[instrument(skip(self), fields(processor = "stripe"))]
    async fn retrieve(&self, payment_intent_id: &str) -> Result<PaymentIntent, ProcessorError> {
        if !self.is_configured() {
            return Err(ProcessorError::NotConfigured);
        }

        let response = self
            .client
            .get(self.intent_url(payment_intent_id))
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;

        self.read_intent(response, "retrieve").await
    }
}
