//! Fallback orchestrator: the single entry point for column settings.
//!
//! Loads walk Remote (with retry) → Cache → Local Backup → Legacy →
//! Defaults and stop at the first tier that yields data. Saves go to Remote
//! (with retry) and fall back to a synchronous Local Backup write. Either
//! way the caller gets a structurally complete [`FallbackResult`]; nothing
//! below this boundary can fail or panic past it.
//!
//! When a fallback tier was used the orchestrator schedules best-effort
//! reconciliation on its [`BackgroundScheduler`]: a resync of backup data,
//! a migration of the legacy blob, or a delayed retry of a failed save.
//! Each task is stamped with the record's save generation and does nothing
//! once a newer save for the same user and report has started.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use mockable::{Clock, DefaultClock};
use tracing::{debug, error, info, warn};

use super::ports::{KeyValueStorage, PreferencesTable, SessionProvider};
use super::{
    BackgroundScheduler, ColumnConfig, DEFAULT_CACHE_TTL, HealthMonitor, HealthReport,
    HealthTargets, LocalBackupStore, RemoteLoad, RemoteSave, RemoteSettingsStore,
    RemoteUnavailable, ReportType, RetryPolicies, SettingsCache, SettingsSleeper,
    TablePreferences, TokioSleeper, UserId, apply_column_order, default_columns,
    merge_with_defaults, retry_with_backoff,
};

mod failure;
mod generations;
mod outcome;

use failure::SettingsFailure;
use generations::{SaveGenerations, SaveTicket};
pub use outcome::{FallbackResult, SettingsSource};

/// Delay before re-pushing backup data to the remote store.
pub const RESYNC_DELAY: Duration = Duration::from_secs(5);
/// Delay before migrating a legacy blob to the remote store.
pub const MIGRATION_DELAY: Duration = Duration::from_secs(2);
/// Delay before refreshing the backup after a successful remote save.
pub const BACKUP_REFRESH_DELAY: Duration = Duration::from_secs(1);
/// Delay before retrying a remote save that exhausted its retries.
pub const SAVE_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Tunables for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorConfig {
    /// Debounce window for remote saves; zero writes immediately.
    pub debounce: Duration,
    /// Lifetime of cache entries.
    pub cache_ttl: Duration,
    /// Retry policies for loads, saves and health probes.
    pub retry: RetryPolicies,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1_000),
            cache_ttl: DEFAULT_CACHE_TTL,
            retry: RetryPolicies::default(),
        }
    }
}

/// Port bundle required by the orchestrator.
pub struct SettingsPorts {
    /// Remote preferences table adapter.
    pub table: Arc<dyn PreferencesTable>,
    /// Session provider adapter.
    pub sessions: Arc<dyn SessionProvider>,
    /// Device-local storage adapter.
    pub storage: Arc<dyn KeyValueStorage>,
}

impl SettingsPorts {
    /// Build a strongly-typed port bundle.
    pub fn new(
        table: Arc<dyn PreferencesTable>,
        sessions: Arc<dyn SessionProvider>,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Self {
        Self {
            table,
            sessions,
            storage,
        }
    }
}

/// Time sources used by the orchestrator and its tiers.
pub struct SettingsRuntime {
    /// Wall clock for timestamps and expiry.
    pub clock: Arc<dyn Clock>,
    /// Sleeper for backoff, debounce and background delays.
    pub sleeper: Arc<dyn SettingsSleeper>,
}

impl Default for SettingsRuntime {
    fn default() -> Self {
        Self {
            clock: Arc::new(DefaultClock),
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

/// Orchestrates the tiers behind load and save.
pub struct SettingsOrchestrator {
    sessions: Arc<dyn SessionProvider>,
    cache: Arc<SettingsCache>,
    remote: RemoteSettingsStore,
    backup: LocalBackupStore,
    health: HealthMonitor,
    background: BackgroundScheduler,
    generations: SaveGenerations,
    sleeper: Arc<dyn SettingsSleeper>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
}

impl SettingsOrchestrator {
    /// Build an orchestrator using the system clock and Tokio timers.
    pub fn new(ports: SettingsPorts, config: OrchestratorConfig) -> Self {
        Self::with_runtime(ports, SettingsRuntime::default(), config)
    }

    /// Build an orchestrator with injected time sources.
    pub fn with_runtime(
        ports: SettingsPorts,
        runtime: SettingsRuntime,
        config: OrchestratorConfig,
    ) -> Self {
        let SettingsRuntime { clock, sleeper } = runtime;
        let cache = Arc::new(SettingsCache::new(config.cache_ttl, Arc::clone(&clock)));
        let remote = RemoteSettingsStore::new(
            ports.table,
            Arc::clone(&ports.sessions),
            Arc::clone(&cache),
            Arc::clone(&sleeper),
            Arc::clone(&clock),
        );
        let backup = LocalBackupStore::new(ports.storage, Arc::clone(&clock));
        let health = HealthMonitor::new(
            HealthTargets {
                remote: remote.clone(),
                backup: backup.clone(),
                sessions: Arc::clone(&ports.sessions),
                cache: Arc::clone(&cache),
            },
            Arc::clone(&sleeper),
            Arc::clone(&clock),
            config.retry.health,
        );

        Self {
            sessions: ports.sessions,
            cache,
            remote,
            backup,
            health,
            background: BackgroundScheduler::new(Arc::clone(&sleeper)),
            generations: SaveGenerations::default(),
            sleeper,
            clock,
            config,
        }
    }

    /// Load settings for `report_type` from the first tier that has them.
    pub async fn load_with_fallback(
        &self,
        report_type: ReportType,
    ) -> FallbackResult<Option<TablePreferences>> {
        match AssertUnwindSafe(self.load_chain(report_type))
            .catch_unwind()
            .await
        {
            Ok(result) => {
                info!(%report_type, source = %result.source, "column settings loaded");
                result
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(%report_type, error = %message, "column settings load panicked");
                FallbackResult::failed(None, message)
                    .with_warning("Saved column settings could not be loaded; showing defaults")
                    .with_recovery("Try refreshing the page")
            }
        }
    }

    /// Save `columns` for `report_type`, optionally reordered by
    /// `column_order`.
    pub async fn save_with_fallback(
        &self,
        report_type: ReportType,
        columns: Vec<ColumnConfig>,
        column_order: Option<&[String]>,
    ) -> FallbackResult<bool> {
        match AssertUnwindSafe(self.save_chain(report_type, columns, column_order))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => {
                info!(%report_type, source = %result.source, "column settings saved");
                result
            }
            Ok(Err(failure)) => {
                error!(%report_type, error = %failure, "column settings save failed");
                Self::save_failed(failure.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(%report_type, error = %message, "column settings save panicked");
                Self::save_failed(message)
            }
        }
    }

    /// Save the report's default column set.
    pub async fn reset_to_defaults(&self, report_type: ReportType) -> FallbackResult<bool> {
        self.save_with_fallback(report_type, default_columns(report_type), None)
            .await
    }

    /// Load with fallback and merge the result with the report's defaults.
    ///
    /// The data is always a complete, ordered column list.
    pub async fn resolve_columns(&self, report_type: ReportType) -> FallbackResult<Vec<ColumnConfig>> {
        let defaults = default_columns(report_type);
        self.load_with_fallback(report_type)
            .await
            .map_data(|loaded| match loaded {
                Some(preferences) => merge_with_defaults(&preferences.columns, &defaults),
                None => defaults,
            })
    }

    /// Evict cached entries for `report_type`.
    pub fn clear_cache(&self, report_type: ReportType) {
        self.cache.clear(report_type, None);
        debug!(%report_type, "settings cache cleared");
    }

    /// Run a health check across every tier.
    pub async fn perform_health_check(&self) -> HealthReport {
        self.health.check().await
    }

    /// The health monitor, for periodic checks.
    pub fn health_monitor(&self) -> &HealthMonitor {
        &self.health
    }

    /// Number of background reconciliation tasks not yet reaped.
    pub fn pending_background_tasks(&self) -> usize {
        self.background.pending()
    }

    /// Wait for every scheduled background task to finish.
    pub async fn shutdown(&self) {
        self.background.shutdown().await;
    }

    async fn load_chain(&self, report_type: ReportType) -> FallbackResult<Option<TablePreferences>> {
        let user = self.current_user(report_type).await;

        match retry_with_backoff(
            &self.config.retry.load,
            self.sleeper.as_ref(),
            |error: &RemoteUnavailable| error.retryable,
            |_| self.remote.load(report_type, user.as_ref()),
        )
        .await
        {
            Ok(RemoteLoad::Found(preferences)) => {
                return FallbackResult::succeeded(Some(preferences), SettingsSource::Database);
            }
            Ok(RemoteLoad::Absent) => {}
            Err(error) => {
                warn!(%report_type, error = %error, "remote settings load failed; falling back");
            }
        }

        if let Some(cached) = user
            .as_ref()
            .and_then(|user| self.cache.get(user, report_type))
        {
            return FallbackResult::succeeded(Some(cached), SettingsSource::Cache);
        }

        if let Some(preferences) = self.backup.read_backup(report_type, user.as_ref()) {
            warn!(%report_type, "serving column settings from local backup");
            let ticket = self.generations.current(report_type, user.as_ref());
            self.background.schedule(
                "settings_resync",
                RESYNC_DELAY,
                push_remote(
                    self.remote.clone(),
                    report_type,
                    preferences.columns.clone(),
                    user,
                    ticket,
                ),
            );
            return FallbackResult::succeeded(Some(preferences), SettingsSource::Backup)
                .with_warning("Using locally backed-up column settings; the server copy could not be loaded")
                .with_recovery("Syncing the local backup to the server in the background");
        }

        if let Some(preferences) = self.backup.read_legacy(report_type) {
            warn!(%report_type, "serving column settings from legacy storage");
            let ticket = self.generations.current(report_type, user.as_ref());
            self.background.schedule(
                "settings_legacy_migration",
                MIGRATION_DELAY,
                migrate_legacy(
                    self.remote.clone(),
                    self.backup.clone(),
                    report_type,
                    preferences.columns.clone(),
                    user,
                    ticket,
                ),
            );
            return FallbackResult::succeeded(Some(preferences), SettingsSource::LocalStorage)
                .with_warning("Using column settings saved in an older format")
                .with_recovery("Migrating the older settings to the server in the background");
        }

        FallbackResult::succeeded(None, SettingsSource::Defaults)
            .with_warning("No saved column settings found; using defaults")
            .with_recovery("Settings will be saved when you first change a column")
    }

    async fn save_chain(
        &self,
        report_type: ReportType,
        columns: Vec<ColumnConfig>,
        column_order: Option<&[String]>,
    ) -> Result<FallbackResult<bool>, SettingsFailure> {
        let mut columns = columns;
        if let Some(order) = column_order {
            apply_column_order(&mut columns, order);
        }
        let user = self.current_user(report_type).await;
        let ticket = self.generations.begin(report_type, user.as_ref());

        let outcome = retry_with_backoff(
            &self.config.retry.save,
            self.sleeper.as_ref(),
            |error: &RemoteUnavailable| error.retryable,
            |_| {
                self.remote
                    .save(report_type, columns.clone(), user.as_ref(), self.config.debounce)
            },
        )
        .await;

        match outcome {
            Ok(RemoteSave::Saved) => {
                let snapshot = self.snapshot(report_type, columns, user.clone());
                let backup = self.backup.clone();
                self.background.schedule(
                    "settings_backup_refresh",
                    BACKUP_REFRESH_DELAY,
                    async move {
                        if !ticket.is_latest() {
                            debug!(%report_type, "newer save started; backup refresh skipped");
                            return Ok(());
                        }
                        backup
                            .write_backup(report_type, user.as_ref(), &snapshot)
                            .map_err(SettingsFailure::from)
                    },
                );
                Ok(FallbackResult::succeeded(true, SettingsSource::Database))
            }
            Ok(RemoteSave::Superseded) => {
                debug!(%report_type, "save superseded by a newer save");
                Ok(FallbackResult::succeeded(true, SettingsSource::Database))
            }
            Ok(RemoteSave::Declined) => {
                let snapshot = self.snapshot(report_type, columns, None);
                self.backup
                    .write_backup(report_type, user.as_ref(), &snapshot)?;
                warn!(%report_type, "no session; column settings kept on this device only");
                Ok(FallbackResult::succeeded(true, SettingsSource::LocalStorage)
                    .with_warning("Not signed in: column settings were saved on this device only and did not reach the server")
                    .with_recovery("Sign in to sync column settings across devices"))
            }
            Err(error) if error.retryable => {
                warn!(%report_type, error = %error, "remote settings save failed; writing local backup");
                let snapshot = self.snapshot(report_type, columns.clone(), user.clone());
                self.backup
                    .write_backup(report_type, user.as_ref(), &snapshot)?;
                self.background.schedule(
                    "settings_save_retry",
                    SAVE_RETRY_DELAY,
                    push_remote(self.remote.clone(), report_type, columns, user, ticket),
                );
                Ok(FallbackResult::succeeded(true, SettingsSource::LocalStorage)
                    .with_warning("Column settings saved locally but did not reach the server; they will sync when the connection recovers")
                    .with_recovery("Retrying the server save in the background"))
            }
            Err(error) => {
                warn!(%report_type, error = %error, "server rejected column settings; kept on this device only");
                let snapshot = self.snapshot(report_type, columns, user.clone());
                self.backup
                    .write_backup(report_type, user.as_ref(), &snapshot)?;
                Ok(FallbackResult::succeeded(true, SettingsSource::LocalStorage)
                    .with_warning("The server rejected the save: column settings were kept on this device only and did not reach the server")
                    .with_recovery("Sign in again, then change a column to sync your settings"))
            }
        }
    }

    async fn current_user(&self, report_type: ReportType) -> Option<UserId> {
        match self.sessions.current_user_id().await {
            Ok(user) => user,
            Err(error) => {
                warn!(%report_type, error = %error, "session lookup failed; continuing anonymously");
                None
            }
        }
    }

    fn snapshot(
        &self,
        report_type: ReportType,
        columns: Vec<ColumnConfig>,
        user: Option<UserId>,
    ) -> TablePreferences {
        TablePreferences::builder(report_type)
            .columns(columns)
            .user_id(user)
            .updated_at(self.clock.utc())
            .build()
    }

    fn save_failed(error: String) -> FallbackResult<bool> {
        FallbackResult::failed(false, error)
            .with_warning("Column settings could not be saved and may be lost on refresh")
            .with_recovery("Try changing the column again in a moment")
    }
}

async fn push_remote(
    remote: RemoteSettingsStore,
    report_type: ReportType,
    columns: Vec<ColumnConfig>,
    user: Option<UserId>,
    ticket: SaveTicket,
) -> Result<(), SettingsFailure> {
    if !ticket.is_latest() {
        debug!(%report_type, "newer save started; remote push skipped");
        return Ok(());
    }
    match remote
        .save(report_type, columns, user.as_ref(), Duration::ZERO)
        .await?
    {
        RemoteSave::Saved | RemoteSave::Superseded => Ok(()),
        RemoteSave::Declined => Err(SettingsFailure::Declined),
    }
}

async fn migrate_legacy(
    remote: RemoteSettingsStore,
    backup: LocalBackupStore,
    report_type: ReportType,
    columns: Vec<ColumnConfig>,
    user: Option<UserId>,
    ticket: SaveTicket,
) -> Result<(), SettingsFailure> {
    push_remote(remote, report_type, columns, user, ticket).await?;
    backup.remove_legacy(report_type)?;
    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unexpected panic".to_owned()
    }
}
