//! PostgREST-compatible store client.
//!
//! Rows are addressed with `?{column}=eq.{value}` filters and updated with
//! `PATCH`, asking for the affected rows back so a missing row is detected.

use crate::config::StoreConfig;
use crate::models::{BookingStartedUpdate, PaymentHeldUpdate, PaymentRecord};
use crate::services::store::{PaymentStore, StoreError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tracing::instrument;

#[derive(Clone)]
pub struct RestStore {
    client: Client,
    config: StoreConfig,
}

impl RestStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url, table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let key = self.config.service_key.expose_secret();
        request.header("apikey", key.as_str()).bearer_auth(key)
    }

    /// Update every row where `column = value` and return how many matched.
    /// Returned rows are counted, not decoded.
    async fn update<B>(
        &self,
        table: &str,
        column: &str,
        value: &str,
        fields: &B,
    ) -> Result<usize, StoreError>
    where
        B: Serialize + Sync,
    {
        let response = self
            .authorized(self.client.patch(self.table_url(table)))
            .query(&[(column, format!("eq.{}", value))])
            .header("Prefer", "return=representation")
            .json(fields)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let rows: Vec<IgnoredAny> = read_rows(response).await?;
        Ok(rows.len())
    }

    async fn select<R>(&self, table: &str, column: &str, value: &str) -> Result<Vec<R>, StoreError>
    where
        R: DeserializeOwned,
    {
        let response = self
            .authorized(self.client.get(self.table_url(table)))
            .query(&[(column, format!("eq.{}", value)), ("select", "*".to_string())])
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        read_rows(response).await
    }
}

async fn read_rows<R: DeserializeOwned>(response: Response) -> Result<Vec<R>, StoreError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| StoreError::Transport(e.to_string()))?;

    if !status.is_success() {
        tracing::error!(status = status.as_u16(), body = %body, "Store request failed");
        return Err(StoreError::Rejected {
            status: status.as_u16(),
            message: body,
        });
    }

    serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))
}

#[async_trait]
impl PaymentStore for RestStore {
    #[instrument(skip(self, update))]
    async fn update_payment(
        &self,
        payment_intent_id: &str,
        update: &PaymentHeldUpdate,
    ) -> Result<(), StoreError> {
        let table = &self.config.payments_table;
        let rows = self
            .update(table, "payment_intent_id", payment_intent_id, update)
            .await?;

        if rows == 0 {
            return Err(StoreError::NotFound {
                table: table.clone(),
                key: format!("payment_intent_id={}", payment_intent_id),
            });
        }

        tracing::info!(rows, "Payment marked completed and held");
        Ok(())
    }

    #[instrument(skip(self, update))]
    async fn update_booking(
        &self,
        booking_id: &str,
        update: &BookingStartedUpdate,
    ) -> Result<(), StoreError> {
        let table = &self.config.bookings_table;
        let rows = self.update(table, "id", booking_id, update).await?;

        if rows == 0 {
            return Err(StoreError::NotFound {
                table: table.clone(),
                key: format!("id={}", booking_id),
            });
        }

        tracing::info!("Booking moved to in_progress");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_payment(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        let rows: Vec<PaymentRecord> = self
            .select(&self.config.payments_table, "payment_intent_id", payment_intent_id)
            .await?;
        Ok(rows.into_iter().next())
    }
}
