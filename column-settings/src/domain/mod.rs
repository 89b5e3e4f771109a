//! Domain types, ports and services for column settings persistence.
//!
//! Purpose: Keep the fallback chain (remote, cache, local backup, legacy
//! blob, defaults) independent of any transport or storage technology.
//! Adapters live in `crate::outbound` and plug in through [`ports`].
//!
//! Public surface:
//! - SettingsOrchestrator (alias to `fallback::SettingsOrchestrator`): the
//!   load/save entry point.
//! - TablePreferences (alias to `preferences::TablePreferences`): the
//!   persisted record.
//! - HealthMonitor (alias to `health::HealthMonitor`): tier probes.

pub mod background;
pub mod cache;
pub mod columns;
pub mod fallback;
pub mod health;
pub mod local_backup;
pub mod ports;
pub mod preferences;
pub mod remote_store;
pub mod report_type;
pub mod retry;
pub mod user;

pub use self::background::BackgroundScheduler;
pub use self::cache::{DEFAULT_CACHE_TTL, SettingsCache};
pub use self::columns::{
    ColumnConfig, DEFAULT_COLUMN_WIDTH, apply_column_order, default_columns, merge_with_defaults,
};
pub use self::fallback::{
    BACKUP_REFRESH_DELAY, FallbackResult, MIGRATION_DELAY, OrchestratorConfig, RESYNC_DELAY,
    SAVE_RETRY_DELAY, SettingsOrchestrator, SettingsPorts, SettingsRuntime, SettingsSource,
};
pub use self::health::{
    HealthMonitor, HealthReport, HealthStatus, HealthTargets, HealthWatch, classify_health,
};
pub use self::local_backup::{BACKUP_MAX_AGE, LocalBackupStore, backup_key, legacy_key};
pub use self::preferences::{
    CURRENT_SCHEMA_VERSION, LEGACY_SCHEMA_VERSION, RECORD_RETENTION, RecordRejection,
    TablePreferences, TablePreferencesBuilder,
};
pub use self::remote_store::{RemoteLoad, RemoteSave, RemoteSettingsStore, RemoteUnavailable};
pub use self::report_type::{ParseReportTypeError, ReportType};
pub use self::retry::{
    RetryPolicies, RetryPolicy, SettingsSleeper, TokioSleeper, retry_with_backoff,
};
pub use self::user::{UserId, UserIdValidationError};
