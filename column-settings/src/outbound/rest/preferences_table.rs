//! Reqwest-backed `PreferencesTable` adapter.
//!
//! Reads filter with PostgREST `eq.` operators; writes POST a one-row array
//! with `on_conflict=user_id,report_type` and `merge-duplicates` so the
//! backend performs the upsert.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};

use super::endpoint::{RestEndpoint, build_client, status_message};
use crate::domain::ports::{PreferencesTable, PreferencesTableError, StoredPreferencesRow};
use crate::domain::{ReportType, UserId};

const TABLE_PATH: &str = "rest/v1/table_preferences";
const CONFLICT_COLUMNS: &str = "user_id,report_type";
const UPSERT_PREFERENCE: &str = "resolution=merge-duplicates,return=minimal";

/// Preferences table reached over HTTP.
pub struct RestPreferencesTable {
    client: Client,
    endpoint: RestEndpoint,
    table_url: Url,
}

impl RestPreferencesTable {
    /// Build an adapter with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`PreferencesTableError::Transport`] when the reqwest client
    /// cannot be constructed or the table URL cannot be derived.
    pub fn new(endpoint: RestEndpoint, timeout: Duration) -> Result<Self, PreferencesTableError> {
        let client = build_client(timeout).map_err(map_transport_error)?;
        let table_url = endpoint
            .url(TABLE_PATH)
            .map_err(|error| PreferencesTableError::transport(error.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            table_url,
        })
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<u8>, PreferencesTableError> {
        let response = self
            .endpoint
            .authorise(request)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        Ok(body.to_vec())
    }
}

#[async_trait]
impl PreferencesTable for RestPreferencesTable {
    async fn select(
        &self,
        user_id: &UserId,
        report_type: ReportType,
    ) -> Result<Option<StoredPreferencesRow>, PreferencesTableError> {
        let request = self
            .client
            .get(self.table_url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[
                ("select", "*".to_owned()),
                ("user_id", format!("eq.{user_id}")),
                ("report_type", format!("eq.{report_type}")),
                ("limit", "1".to_owned()),
            ]);
        let body = self.send(request).await?;
        decode_rows(&body).map(|rows| rows.into_iter().next())
    }

    async fn upsert(&self, row: &StoredPreferencesRow) -> Result<(), PreferencesTableError> {
        let request = self
            .client
            .post(self.table_url.clone())
            .header("Prefer", UPSERT_PREFERENCE)
            .query(&[("on_conflict", CONFLICT_COLUMNS)])
            .json(&[row]);
        self.send(request).await.map(|_| ())
    }

    async fn probe(&self) -> Result<(), PreferencesTableError> {
        let request = self
            .client
            .get(self.table_url.clone())
            .query(&[("select", "user_id"), ("limit", "1")]);
        self.send(request).await.map(|_| ())
    }
}

fn decode_rows(body: &[u8]) -> Result<Vec<StoredPreferencesRow>, PreferencesTableError> {
    serde_json::from_slice(body).map_err(|error| {
        PreferencesTableError::decode(format!("invalid table_preferences payload: {error}"))
    })
}

fn map_transport_error(error: reqwest::Error) -> PreferencesTableError {
    if error.is_connect() {
        PreferencesTableError::connection(error.to_string())
    } else {
        PreferencesTableError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> PreferencesTableError {
    let message = status_message(status.as_u16(), body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PreferencesTableError::unauthorized(message)
        }
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::GATEWAY_TIMEOUT => PreferencesTableError::transport(message),
        _ if status.is_client_error() => PreferencesTableError::query(message),
        _ => PreferencesTableError::transport(message),
    }
}
