//! Point-in-time and periodic diagnostics for the settings tiers.
//!
//! A check never fails: probes that error are recorded as `false`, and a
//! panic inside the check collapses the report to `critical`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use mockable::Clock;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::ports::SessionProvider;
use super::{
    LocalBackupStore, RemoteSettingsStore, RemoteUnavailable, RetryPolicy, SettingsCache,
    SettingsSleeper, retry_with_backoff,
};

/// Overall classification of a health report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every tier is available.
    Healthy,
    /// The cache plus at least one durable tier is available.
    Degraded,
    /// No durable tier is available.
    Critical,
}

/// Snapshot produced by [`HealthMonitor::check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Overall classification.
    pub overall: HealthStatus,
    /// Remote table answered a probe.
    pub database: bool,
    /// In-memory cache availability; always true.
    pub cache: bool,
    /// Device storage survived a write-then-remove probe.
    pub local_storage: bool,
    /// A signed-in user could be resolved.
    pub user: bool,
    /// Informational cache size.
    pub cache_entries: usize,
    /// Human-readable problems found.
    pub issues: Vec<String>,
    /// Suggested remedies, parallel in spirit to `issues`.
    pub recommendations: Vec<String>,
    /// When the check ran.
    pub checked_at: DateTime<Utc>,
}

/// Classify tier availability into an overall status.
///
/// # Examples
///
/// ```
/// # use column_settings::domain::{HealthStatus, classify_health};
/// assert_eq!(classify_health(true, true, true, true), HealthStatus::Healthy);
/// assert_eq!(classify_health(false, true, true, true), HealthStatus::Degraded);
/// assert_eq!(classify_health(false, true, false, true), HealthStatus::Critical);
/// ```
pub fn classify_health(
    database: bool,
    cache: bool,
    local_storage: bool,
    user: bool,
) -> HealthStatus {
    if database && cache && local_storage && user {
        HealthStatus::Healthy
    } else if cache && (database || local_storage) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Critical
    }
}

/// Probes every tier without touching the data path.
#[derive(Clone)]
pub struct HealthMonitor {
    remote: RemoteSettingsStore,
    backup: LocalBackupStore,
    sessions: Arc<dyn SessionProvider>,
    cache: Arc<SettingsCache>,
    sleeper: Arc<dyn SettingsSleeper>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

/// Collaborators probed by a [`HealthMonitor`].
pub struct HealthTargets {
    /// Remote tier.
    pub remote: RemoteSettingsStore,
    /// Backup tier.
    pub backup: LocalBackupStore,
    /// Session provider.
    pub sessions: Arc<dyn SessionProvider>,
    /// Cache tier.
    pub cache: Arc<SettingsCache>,
}

impl HealthMonitor {
    /// Build a monitor that probes the remote tier under `policy`.
    pub fn new(
        targets: HealthTargets,
        sleeper: Arc<dyn SettingsSleeper>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            remote: targets.remote,
            backup: targets.backup,
            sessions: targets.sessions,
            cache: targets.cache,
            sleeper,
            clock,
            policy,
        }
    }

    /// Run every probe and classify the result.
    pub async fn check(&self) -> HealthReport {
        match AssertUnwindSafe(self.run_probes()).catch_unwind().await {
            Ok(report) => report,
            Err(_) => {
                error!("health check panicked");
                HealthReport {
                    overall: HealthStatus::Critical,
                    database: false,
                    cache: true,
                    local_storage: false,
                    user: false,
                    cache_entries: 0,
                    issues: vec!["Health check failed unexpectedly".to_owned()],
                    recommendations: vec!["Refresh the page and try again".to_owned()],
                    checked_at: self.clock.utc(),
                }
            }
        }
    }

    /// Run [`Self::check`] every `interval`, publishing each report.
    ///
    /// The first check runs immediately. The task stops when the returned
    /// handle is dropped. Must be called from within a Tokio runtime.
    pub fn spawn_periodic(&self, interval: Duration) -> HealthWatch {
        let (sender, receiver) = watch::channel(None);
        let monitor = self.clone();
        let task = tokio::spawn(async move {
            loop {
                let report = monitor.check().await;
                debug!(overall = ?report.overall, "periodic health check");
                if sender.send(Some(report)).is_err() {
                    break;
                }
                monitor.sleeper.sleep(interval).await;
            }
        });
        HealthWatch { receiver, task }
    }

    async fn run_probes(&self) -> HealthReport {
        let database = match retry_with_backoff(
            &self.policy,
            self.sleeper.as_ref(),
            |error: &RemoteUnavailable| error.retryable,
            |_| self.remote.probe(),
        )
        .await
        {
            Ok(()) => true,
            Err(error) => {
                warn!(error = %error, "remote preferences probe failed");
                false
            }
        };
        let local_storage = match self.backup.probe() {
            Ok(()) => true,
            Err(error) => {
                warn!(error = %error, "device storage probe failed");
                false
            }
        };
        let user = match self.sessions.current_user_id().await {
            Ok(user) => user.is_some(),
            Err(error) => {
                warn!(error = %error, "session lookup failed during health check");
                false
            }
        };
        let cache = true;

        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        if !database {
            issues.push("Database connection failed".to_owned());
            recommendations.push(
                "Check the network connection; settings are kept locally until it recovers"
                    .to_owned(),
            );
        }
        if !local_storage {
            issues.push("Local storage is unavailable".to_owned());
            recommendations.push(
                "Free up device storage or enable site data so settings can be backed up"
                    .to_owned(),
            );
        }
        if !user {
            issues.push("No authenticated user session".to_owned());
            recommendations.push("Sign in to sync settings across devices".to_owned());
        }

        HealthReport {
            overall: classify_health(database, cache, local_storage, user),
            database,
            cache,
            local_storage,
            user,
            cache_entries: self.cache.len(),
            issues,
            recommendations,
            checked_at: self.clock.utc(),
        }
    }
}

/// Handle to a periodic health check task.
///
/// Dropping the handle stops the task.
pub struct HealthWatch {
    receiver: watch::Receiver<Option<HealthReport>>,
    task: JoinHandle<()>,
}

impl HealthWatch {
    /// The most recent report, if a check has completed.
    pub fn latest(&self) -> Option<HealthReport> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next report.
    ///
    /// Returns `None` once the task has stopped.
    pub async fn next(&mut self) -> Option<HealthReport> {
        self.receiver.changed().await.ok()?;
        self.receiver.borrow_and_update().clone()
    }

    /// A receiver for callers that want to observe reports directly.
    pub fn subscribe(&self) -> watch::Receiver<Option<HealthReport>> {
        self.receiver.clone()
    }
}

impl Drop for HealthWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}
