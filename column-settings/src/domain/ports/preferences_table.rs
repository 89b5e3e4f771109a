//! Port for the hosted `table_preferences` table.
//!
//! The table stores one row per `(user_id, report_type)` pair with an opaque
//! JSON `preferences` payload. The domain validates the payload itself; the
//! adapters only move rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ReportType, UserId};

use super::define_port_error;

/// One row of the preferences table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPreferencesRow {
    /// Owning user.
    pub user_id: UserId,
    /// Report the payload belongs to.
    pub report_type: ReportType,
    /// Untrusted `TablePreferences` JSON payload.
    pub preferences: Value,
    /// Last write instant.
    pub updated_at: DateTime<Utc>,
}

define_port_error! {
    /// Errors raised by preferences table adapters.
    pub enum PreferencesTableError {
        /// The backend could not be reached, timed out, or returned 5xx.
        Transport { message: String } =>
            "preferences table transport failure: {message}",
        /// Credentials were missing, expired or rejected.
        Unauthorized { message: String } =>
            "preferences table rejected credentials: {message}",
        /// Connection pool or database connection failure.
        Connection { message: String } =>
            "preferences table connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "preferences table query failed: {message}",
        /// The response body could not be decoded into rows.
        Decode { message: String } =>
            "preferences table response could not be decoded: {message}",
    }
}

impl PreferencesTableError {
    /// Whether retrying the call could plausibly succeed.
    ///
    /// Network and connection failures are transient; rejected credentials,
    /// failed statements and undecodable responses are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Connection { .. })
    }
}

/// Port for reading and upserting preference rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreferencesTable: Send + Sync {
    /// Fetch the row for `(user_id, report_type)`; `None` when not found.
    async fn select(
        &self,
        user_id: &UserId,
        report_type: ReportType,
    ) -> Result<Option<StoredPreferencesRow>, PreferencesTableError>;

    /// Insert or replace the row keyed by `(user_id, report_type)`.
    async fn upsert(&self, row: &StoredPreferencesRow) -> Result<(), PreferencesTableError>;

    /// Issue a lightweight read proving the table is reachable.
    async fn probe(&self) -> Result<(), PreferencesTableError>;
}

/// Fixture table that stores nothing and always answers "not found".
#[derive(Debug, Default, Clone, Copy)]
pub struct FixturePreferencesTable;

#[async_trait]
impl PreferencesTable for FixturePreferencesTable {
    async fn select(
        &self,
        _user_id: &UserId,
        _report_type: ReportType,
    ) -> Result<Option<StoredPreferencesRow>, PreferencesTableError> {
        Ok(None)
    }

    async fn upsert(&self, _row: &StoredPreferencesRow) -> Result<(), PreferencesTableError> {
        Ok(())
    }

    async fn probe(&self) -> Result<(), PreferencesTableError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[tokio::test]
    async fn fixture_table_lookup_returns_none() {
        let table = FixturePreferencesTable;
        let row = table
            .select(&UserId::random(), ReportType::MainReport)
            .await
            .expect("fixture lookup succeeds");
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn fixture_table_accepts_upserts() {
        let row = StoredPreferencesRow {
            user_id: UserId::random(),
            report_type: ReportType::ProductsReport,
            preferences: json!({"columns": []}),
            updated_at: Utc::now(),
        };
        FixturePreferencesTable
            .upsert(&row)
            .await
            .expect("fixture upsert succeeds");
    }

    #[rstest]
    #[case::transport(PreferencesTableError::transport("timeout"), true)]
    #[case::connection(PreferencesTableError::connection("pool exhausted"), true)]
    #[case::unauthorized(PreferencesTableError::unauthorized("expired jwt"), false)]
    #[case::query(PreferencesTableError::query("syntax"), false)]
    #[case::decode(PreferencesTableError::decode("not an array"), false)]
    fn retry_classification(#[case] error: PreferencesTableError, #[case] retryable: bool) {
        assert_eq!(error.is_retryable(), retryable);
    }
}
