//! Table preferences aggregate and stored-record validation.
//!
//! This module defines `TablePreferences`, the per-user, per-report record
//! holding column settings. Stored payloads are untrusted: they may come from
//! older clients, other devices, or hand-edited rows, so every tier reads
//! them through [`TablePreferences::from_stored`], which rejects malformed,
//! foreign-version and expired records instead of partially trusting them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ColumnConfig, ReportType, UserId};

/// Schema version written by current code.
pub const CURRENT_SCHEMA_VERSION: &str = "2.0";

/// Schema version carried by pre-user-scoped local blobs.
pub const LEGACY_SCHEMA_VERSION: &str = "1.0";

/// Age at which a stored record is treated as absent.
pub const RECORD_RETENTION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Column preferences for one (user, report type) pair.
///
/// # Examples
///
/// ```
/// # use column_settings::domain::{ColumnConfig, ReportType, TablePreferences};
/// # use chrono::{TimeZone, Utc};
/// let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid time");
/// let prefs = TablePreferences::builder(ReportType::MainReport)
///     .columns(vec![ColumnConfig::new("date", 120, 0)])
///     .updated_at(now)
///     .build();
///
/// assert_eq!(prefs.version, "2.0");
/// assert_eq!(prefs.timestamp, now.timestamp_millis());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePreferences {
    /// Column settings; `order` is authoritative for display order.
    pub columns: Vec<ColumnConfig>,
    /// Creation or update instant in epoch milliseconds.
    pub timestamp: i64,
    /// Schema version string.
    pub version: String,
    /// Report these settings belong to.
    pub report_type: ReportType,
    /// Owning user; absent for anonymous local copies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl TablePreferences {
    /// Create a builder for the given report.
    pub fn builder(report_type: ReportType) -> TablePreferencesBuilder {
        TablePreferencesBuilder::new(report_type)
    }

    /// Validate an untrusted stored payload.
    ///
    /// `report_type` fills in records written before the field existed.
    ///
    /// # Errors
    ///
    /// Returns [`RecordRejection`] when the payload lacks `columns` or
    /// `timestamp`, names a report other than `report_type`, carries a
    /// version other than `expected_version`, or is at least `retention` old
    /// at `now`.
    pub fn from_stored(
        payload: Value,
        report_type: ReportType,
        expected_version: &str,
        retention: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, RecordRejection> {
        let record: StoredRecord = serde_json::from_value(payload)
            .map_err(|err| RecordRejection::malformed(err.to_string()))?;

        let Some(columns) = record.columns else {
            return Err(RecordRejection::malformed("missing columns array"));
        };
        let Some(timestamp) = record.timestamp else {
            return Err(RecordRejection::malformed("missing timestamp"));
        };
        if let Some(stored) = record.report_type.filter(|stored| *stored != report_type) {
            return Err(RecordRejection::malformed(format!(
                "record belongs to {stored}, not {report_type}"
            )));
        }
        if record.version.as_deref() != Some(expected_version) {
            return Err(RecordRejection::VersionMismatch {
                expected: expected_version.to_owned(),
                found: record.version,
            });
        }
        if is_expired(timestamp, retention, now) {
            return Err(RecordRejection::Expired { timestamp });
        }

        Ok(Self {
            columns,
            timestamp,
            version: expected_version.to_owned(),
            report_type,
            user_id: record.user_id,
        })
    }

    /// Serialise into the stored JSON payload shape.
    pub fn to_payload(&self) -> Value {
        // Serialising plain data with string keys cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Report whether a record stamped at `timestamp_ms` is at least `window` old.
///
/// A record exactly at the boundary is expired.
pub fn is_expired(timestamp_ms: i64, window: Duration, now: DateTime<Utc>) -> bool {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    now.timestamp_millis().saturating_sub(timestamp_ms) >= window_ms
}

/// Why a stored record was treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordRejection {
    /// Payload failed basic shape validation.
    #[error("malformed preferences record: {message}")]
    Malformed {
        /// Parser or shape diagnostic.
        message: String,
    },
    /// Payload was written under a different schema version.
    #[error("preferences version mismatch: expected {expected}, found {found:?}")]
    VersionMismatch {
        /// Version the reader understands.
        expected: String,
        /// Version found in the payload, if any.
        found: Option<String>,
    },
    /// Payload is older than the retention window.
    #[error("preferences record expired (timestamp {timestamp})")]
    Expired {
        /// Stored epoch-millisecond timestamp.
        timestamp: i64,
    },
}

impl RecordRejection {
    fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    columns: Option<Vec<ColumnConfig>>,
    timestamp: Option<i64>,
    version: Option<String>,
    report_type: Option<ReportType>,
    user_id: Option<UserId>,
}

/// Builder for constructing [`TablePreferences`] incrementally.
#[derive(Debug, Clone)]
pub struct TablePreferencesBuilder {
    report_type: ReportType,
    columns: Vec<ColumnConfig>,
    user_id: Option<UserId>,
    updated_at: Option<DateTime<Utc>>,
}

impl TablePreferencesBuilder {
    /// Create a new builder for the given report.
    pub fn new(report_type: ReportType) -> Self {
        Self {
            report_type,
            columns: Vec::new(),
            user_id: None,
            updated_at: None,
        }
    }

    /// Set the column settings.
    pub fn columns(mut self, columns: Vec<ColumnConfig>) -> Self {
        self.columns = columns;
        self
    }

    /// Set the owning user.
    pub fn user_id(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Set the update instant.
    pub fn updated_at(mut self, ts: DateTime<Utc>) -> Self {
        self.updated_at = Some(ts);
        self
    }

    /// Build the final [`TablePreferences`] in the current schema version.
    pub fn build(self) -> TablePreferences {
        TablePreferences {
            columns: self.columns,
            timestamp: self.updated_at.unwrap_or_else(Utc::now).timestamp_millis(),
            version: CURRENT_SCHEMA_VERSION.to_owned(),
            report_type: self.report_type,
            user_id: self.user_id,
        }
    }
}
