//! Device-local backup copies and the legacy pre-user-scoped blob.
//!
//! Backups live under `table_settings_backup_<REPORT>_<user|anonymous>` and
//! carry a `backupTimestamp` next to the preferences fields. They are only
//! trusted for 24 hours and are purged when read past that age or when they
//! cannot be parsed. The legacy blob under `table_settings_<REPORT>` is read
//! for migration and deleted once migrated; it is never written.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mockable::Clock;
use serde_json::Value;
use tracing::{debug, warn};

use super::ports::{KeyValueStorage, KeyValueStorageError};
use super::preferences::{
    CURRENT_SCHEMA_VERSION, LEGACY_SCHEMA_VERSION, RECORD_RETENTION, is_expired,
};
use super::{ReportType, TablePreferences, UserId};

/// Age at which a backup copy is considered too stale to use.
pub const BACKUP_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

const BACKUP_TIMESTAMP_FIELD: &str = "backupTimestamp";
const LEGACY_EXPIRES_AT_FIELD: &str = "expiresAt";
const PROBE_KEY: &str = "table_settings_storage_probe";
const ANONYMOUS_NAMESPACE: &str = "anonymous";

/// Storage key of the backup copy for `report_type` and `user_id`.
///
/// # Examples
///
/// ```
/// # use column_settings::domain::{ReportType, backup_key};
/// assert_eq!(
///     backup_key(ReportType::MainReport, None),
///     "table_settings_backup_MAIN_REPORT_anonymous"
/// );
/// ```
pub fn backup_key(report_type: ReportType, user_id: Option<&UserId>) -> String {
    let namespace = user_id.map_or(ANONYMOUS_NAMESPACE, |user_id| user_id.as_ref());
    format!("table_settings_backup_{report_type}_{namespace}")
}

/// Storage key of the legacy blob for `report_type`.
pub fn legacy_key(report_type: ReportType) -> String {
    format!("table_settings_{report_type}")
}

/// Backup and legacy tiers over device-local storage.
#[derive(Clone)]
pub struct LocalBackupStore {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
}

impl LocalBackupStore {
    /// Build a store over `storage`.
    pub fn new(storage: Arc<dyn KeyValueStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Write `preferences` plus a backup timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`KeyValueStorageError`] when the device storage rejects the
    /// write.
    pub fn write_backup(
        &self,
        report_type: ReportType,
        user_id: Option<&UserId>,
        preferences: &TablePreferences,
    ) -> Result<(), KeyValueStorageError> {
        let key = backup_key(report_type, user_id);
        let mut payload = preferences.to_payload();
        if let Value::Object(fields) = &mut payload {
            fields.insert(
                BACKUP_TIMESTAMP_FIELD.to_owned(),
                Value::from(self.clock.utc().timestamp_millis()),
            );
        }
        self.storage.set_item(&key, &payload.to_string())?;
        debug!(%report_type, key = %key, "local backup written");
        Ok(())
    }

    /// Read the backup copy, purging it when stale, unreadable, or owned by
    /// a user other than `user_id`.
    pub fn read_backup(
        &self,
        report_type: ReportType,
        user_id: Option<&UserId>,
    ) -> Option<TablePreferences> {
        let key = backup_key(report_type, user_id);
        let raw = self.read_raw(&key)?;
        let now = self.clock.utc();

        match parse_backup(&raw, report_type, user_id, now) {
            Ok(preferences) => Some(preferences),
            Err(reason) => {
                warn!(%report_type, key = %key, reason = %reason, "discarding local backup");
                self.purge(&key);
                None
            }
        }
    }

    /// Read the legacy blob if it is still current.
    pub fn read_legacy(&self, report_type: ReportType) -> Option<TablePreferences> {
        let key = legacy_key(report_type);
        let raw = self.read_raw(&key)?;
        let now = self.clock.utc();

        let payload: Value = match serde_json::from_str(&raw) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%report_type, key = %key, error = %error, "legacy settings blob is not JSON");
                return None;
            }
        };
        let expires_at = payload
            .get(LEGACY_EXPIRES_AT_FIELD)
            .and_then(Value::as_i64);
        if expires_at.is_some_and(|expires_at| now.timestamp_millis() >= expires_at) {
            debug!(%report_type, key = %key, "legacy settings blob past its expiry");
            return None;
        }
        match TablePreferences::from_stored(
            payload,
            report_type,
            LEGACY_SCHEMA_VERSION,
            RECORD_RETENTION,
            now,
        ) {
            Ok(preferences) => Some(preferences),
            Err(rejection) => {
                debug!(%report_type, key = %key, reason = %rejection, "legacy settings blob ignored");
                None
            }
        }
    }

    /// Delete the legacy blob after a successful migration.
    ///
    /// # Errors
    ///
    /// Returns [`KeyValueStorageError`] when the device storage rejects the
    /// removal.
    pub fn remove_legacy(&self, report_type: ReportType) -> Result<(), KeyValueStorageError> {
        self.storage.remove_item(&legacy_key(report_type))
    }

    /// Write, read back and remove a probe key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyValueStorageError`] when any step fails or the value read
    /// back differs from the one written.
    pub fn probe(&self) -> Result<(), KeyValueStorageError> {
        let marker = self.clock.utc().timestamp_millis().to_string();
        self.storage.set_item(PROBE_KEY, &marker)?;
        let read_back = self.storage.get_item(PROBE_KEY)?;
        self.storage.remove_item(PROBE_KEY)?;
        if read_back.as_deref() == Some(marker.as_str()) {
            Ok(())
        } else {
            Err(KeyValueStorageError::io(
                PROBE_KEY,
                "probe value did not round-trip",
            ))
        }
    }

    fn read_raw(&self, key: &str) -> Option<String> {
        match self.storage.get_item(key) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(key, error = %error, "device storage read failed");
                None
            }
        }
    }

    fn purge(&self, key: &str) {
        if let Err(error) = self.storage.remove_item(key) {
            warn!(key, error = %error, "failed to purge local backup");
        }
    }
}

fn parse_backup(
    raw: &str,
    report_type: ReportType,
    user_id: Option<&UserId>,
    now: DateTime<Utc>,
) -> Result<TablePreferences, String> {
    let payload: Value = serde_json::from_str(raw).map_err(|error| error.to_string())?;
    let backed_up_at = payload
        .get(BACKUP_TIMESTAMP_FIELD)
        .and_then(Value::as_i64)
        .ok_or_else(|| "missing backup timestamp".to_owned())?;
    if is_expired(backed_up_at, BACKUP_MAX_AGE, now) {
        return Err("backup older than 24 hours".to_owned());
    }
    let preferences = TablePreferences::from_stored(
        payload,
        report_type,
        CURRENT_SCHEMA_VERSION,
        RECORD_RETENTION,
        now,
    )
    .map_err(|rejection| rejection.to_string())?;
    match preferences.user_id.as_ref() {
        Some(owner) if Some(owner) != user_id => Err(format!("backup belongs to user {owner}")),
        _ => Ok(preferences),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ColumnConfig;
    use crate::domain::ports::MockKeyValueStorage;
    use crate::test_support::{InMemoryKeyValueStorage, MutableClock};
    use chrono::{TimeDelta, TimeZone};
    use rstest::{fixture, rstest};
    use serde_json::json;

    struct Harness {
        storage: Arc<InMemoryKeyValueStorage>,
        clock: Arc<MutableClock>,
        store: LocalBackupStore,
    }

    #[fixture]
    fn harness() -> Harness {
        let start = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid time");
        let clock = Arc::new(MutableClock::new(start));
        let storage = Arc::new(InMemoryKeyValueStorage::new());
        let store = LocalBackupStore::new(storage.clone(), clock.clone());
        Harness {
            storage,
            clock,
            store,
        }
    }

    fn preferences(harness: &Harness, user_id: Option<UserId>) -> TablePreferences {
        TablePreferences::builder(ReportType::MainReport)
            .columns(vec![ColumnConfig::new("date", 130, 0)])
            .user_id(user_id)
            .updated_at(harness.clock.utc())
            .build()
    }

    #[rstest]
    fn backup_round_trips_under_user_scoped_key(harness: Harness) {
        let user = UserId::random();
        let prefs = preferences(&harness, Some(user.clone()));

        harness
            .store
            .write_backup(ReportType::MainReport, Some(&user), &prefs)
            .expect("write succeeds");

        let key = format!("table_settings_backup_MAIN_REPORT_{user}");
        let raw = harness
            .storage
            .get_item(&key)
            .expect("read succeeds")
            .expect("backup present");
        let stored: Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(
            stored["backupTimestamp"],
            json!(harness.clock.utc().timestamp_millis())
        );
        assert_eq!(
            harness.store.read_backup(ReportType::MainReport, Some(&user)),
            Some(prefs)
        );
        assert!(
            harness
                .store
                .read_backup(ReportType::MainReport, None)
                .is_none(),
            "anonymous namespace is separate"
        );
    }

    #[rstest]
    #[case::just_fresh(TimeDelta::hours(24) - TimeDelta::milliseconds(1), true)]
    #[case::boundary(TimeDelta::hours(24), false)]
    #[case::stale(TimeDelta::hours(30), false)]
    fn backup_expires_at_24_hours(
        harness: Harness,
        #[case] age: TimeDelta,
        #[case] usable: bool,
    ) {
        let prefs = preferences(&harness, None);
        harness
            .store
            .write_backup(ReportType::MainReport, None, &prefs)
            .expect("write succeeds");
        harness.clock.advance(age.to_std().expect("positive age"));

        let read = harness.store.read_backup(ReportType::MainReport, None);

        assert_eq!(read.is_some(), usable);
        let still_stored = harness
            .storage
            .get_item(&backup_key(ReportType::MainReport, None))
            .expect("read succeeds")
            .is_some();
        assert_eq!(still_stored, usable, "stale backups are purged on read");
    }

    #[rstest]
    #[case::not_json("{not json")]
    #[case::no_backup_timestamp(r#"{"columns":[],"timestamp":1,"version":"2.0"}"#)]
    fn unreadable_backup_is_purged(harness: Harness, #[case] raw: &str) {
        let key = backup_key(ReportType::ProductsReport, None);
        harness.storage.set_item(&key, raw).expect("seed");

        assert!(
            harness
                .store
                .read_backup(ReportType::ProductsReport, None)
                .is_none()
        );
        assert_eq!(harness.storage.get_item(&key).expect("read"), None);
    }

    #[rstest]
    fn backup_owned_by_another_user_is_purged(harness: Harness) {
        let owner = UserId::random();
        let reader = UserId::random();
        let key = backup_key(ReportType::MainReport, Some(&reader));
        let mut payload = preferences(&harness, Some(owner)).to_payload();
        payload["backupTimestamp"] = json!(harness.clock.utc().timestamp_millis());
        harness
            .storage
            .set_item(&key, &payload.to_string())
            .expect("seed");

        assert!(
            harness
                .store
                .read_backup(ReportType::MainReport, Some(&reader))
                .is_none()
        );
        assert_eq!(harness.storage.get_item(&key).expect("read"), None);
    }

    #[rstest]
    fn backup_for_another_report_is_purged(harness: Harness) {
        let prefs = preferences(&harness, None);
        let key = backup_key(ReportType::ProductsReport, None);
        let mut payload = prefs.to_payload();
        payload["backupTimestamp"] = json!(harness.clock.utc().timestamp_millis());
        harness
            .storage
            .set_item(&key, &payload.to_string())
            .expect("seed");

        assert!(
            harness
                .store
                .read_backup(ReportType::ProductsReport, None)
                .is_none()
        );
        assert_eq!(harness.storage.get_item(&key).expect("read"), None);
    }

    #[rstest]
    fn legacy_blob_is_read_but_never_purged_by_reads(harness: Harness) {
        let now = harness.clock.utc().timestamp_millis();
        let blob = json!({
            "columns": [{"id": "name", "width": 210, "order": 0}],
            "timestamp": now,
            "version": "1.0",
        });
        harness
            .storage
            .set_item("table_settings_PRODUCTS_REPORT", &blob.to_string())
            .expect("seed");

        let legacy = harness
            .store
            .read_legacy(ReportType::ProductsReport)
            .expect("legacy present");

        assert_eq!(legacy.version, "1.0");
        assert_eq!(legacy.columns, vec![ColumnConfig::new("name", 210, 0)]);
        assert!(legacy.user_id.is_none());

        harness
            .store
            .remove_legacy(ReportType::ProductsReport)
            .expect("remove succeeds");
        assert!(
            harness
                .store
                .read_legacy(ReportType::ProductsReport)
                .is_none()
        );
    }

    #[rstest]
    #[case::current_version(json!({"columns": [], "version": "2.0"}), 0)]
    #[case::older_than_a_year(json!({"columns": [], "version": "1.0"}), 366)]
    #[case::expires_at_passed(json!({"columns": [], "version": "1.0", "expiresAt": 0}), 0)]
    fn unusable_legacy_blob_is_absent(
        harness: Harness,
        #[case] blob: Value,
        #[case] age_days: i64,
    ) {
        let mut blob = blob;
        let stamped = harness.clock.utc() - TimeDelta::days(age_days);
        blob["timestamp"] = json!(stamped.timestamp_millis());
        harness
            .storage
            .set_item(&legacy_key(ReportType::MainReport), &blob.to_string())
            .expect("seed");

        assert!(harness.store.read_legacy(ReportType::MainReport).is_none());
    }

    #[rstest]
    fn probe_leaves_no_trace(harness: Harness) {
        harness.store.probe().expect("probe succeeds");
        assert_eq!(harness.storage.get_item(PROBE_KEY).expect("read"), None);
    }

    #[test]
    fn probe_reports_quota_errors() {
        let mut storage = MockKeyValueStorage::new();
        storage
            .expect_set_item()
            .returning(|key, _| Err(KeyValueStorageError::io(key, "quota exceeded")));
        let clock = Arc::new(MutableClock::new(Utc::now()));
        let store = LocalBackupStore::new(Arc::new(storage), clock);

        let err = store.probe().expect_err("quota exceeded");
        assert!(err.to_string().contains("quota exceeded"));
    }
}
