//! Authoritative per-user preferences held in the hosted table.
//!
//! Writes are debounced per `(user, report type)`: a newer save for the same
//! key aborts the pending timer and tells the earlier caller it was
//! superseded. Once a timer fires and the write is in flight it is never
//! cancelled. Successful loads and saves populate the [`SettingsCache`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockable::Clock;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use super::ports::{
    PreferencesTable, PreferencesTableError, SessionError, SessionProvider, StoredPreferencesRow,
};
use super::preferences::{CURRENT_SCHEMA_VERSION, RECORD_RETENTION, RecordRejection};
use super::{ColumnConfig, ReportType, SettingsCache, SettingsSleeper, TablePreferences, UserId};

/// Result of a remote load that reached the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteLoad {
    /// A valid, current-version record exists.
    Found(TablePreferences),
    /// No usable record: not found, no session, malformed, foreign version or
    /// expired.
    Absent,
}

/// Result of a remote save that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteSave {
    /// The write reached the backend.
    Saved,
    /// A newer save for the same key replaced this one before it was sent.
    Superseded,
    /// Nobody is signed in, so nothing was written.
    Declined,
}

/// The backend or session provider could not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("remote settings store unavailable: {message}")]
pub struct RemoteUnavailable {
    /// Diagnostic text from the failing collaborator.
    pub message: String,
    /// Whether retrying could plausibly succeed.
    pub retryable: bool,
}

impl RemoteUnavailable {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl From<PreferencesTableError> for RemoteUnavailable {
    fn from(error: PreferencesTableError) -> Self {
        Self {
            retryable: error.is_retryable(),
            message: error.to_string(),
        }
    }
}

impl From<SessionError> for RemoteUnavailable {
    fn from(error: SessionError) -> Self {
        Self {
            retryable: error.is_retryable(),
            message: error.to_string(),
        }
    }
}

type SaveResult = Result<RemoteSave, RemoteUnavailable>;
type PendingKey = (UserId, ReportType);

struct PendingSave {
    generation: u64,
    waiter: oneshot::Sender<SaveResult>,
    timer: AbortHandle,
}

/// Remote tier of the fallback chain.
#[derive(Clone)]
pub struct RemoteSettingsStore {
    table: Arc<dyn PreferencesTable>,
    sessions: Arc<dyn SessionProvider>,
    cache: Arc<SettingsCache>,
    sleeper: Arc<dyn SettingsSleeper>,
    clock: Arc<dyn Clock>,
    pending: Arc<Mutex<HashMap<PendingKey, PendingSave>>>,
    next_generation: Arc<AtomicU64>,
}

impl RemoteSettingsStore {
    /// Build a store over the given table and session provider.
    pub fn new(
        table: Arc<dyn PreferencesTable>,
        sessions: Arc<dyn SessionProvider>,
        cache: Arc<SettingsCache>,
        sleeper: Arc<dyn SettingsSleeper>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            table,
            sessions,
            cache,
            sleeper,
            clock,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Load the record for `report_type`.
    ///
    /// When `user_id` is `None` the current session is resolved first.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteUnavailable`] when the session lookup or the table
    /// read fails.
    pub async fn load(
        &self,
        report_type: ReportType,
        user_id: Option<&UserId>,
    ) -> Result<RemoteLoad, RemoteUnavailable> {
        let Some(user_id) = self.resolve_user(user_id).await? else {
            debug!(%report_type, "no session; remote load skipped");
            return Ok(RemoteLoad::Absent);
        };

        let Some(row) = self.table.select(&user_id, report_type).await? else {
            debug!(%report_type, %user_id, "no remote preferences row");
            return Ok(RemoteLoad::Absent);
        };

        match TablePreferences::from_stored(
            row.preferences,
            report_type,
            CURRENT_SCHEMA_VERSION,
            RECORD_RETENTION,
            self.clock.utc(),
        ) {
            Ok(mut preferences) => {
                preferences.user_id.get_or_insert_with(|| user_id.clone());
                self.cache.put(&user_id, report_type, preferences.clone());
                Ok(RemoteLoad::Found(preferences))
            }
            Err(rejection @ RecordRejection::Malformed { .. }) => {
                warn!(%report_type, %user_id, error = %rejection, "discarding malformed remote preferences");
                self.cache.clear(report_type, None);
                Ok(RemoteLoad::Absent)
            }
            Err(rejection) => {
                debug!(%report_type, %user_id, reason = %rejection, "remote preferences ignored");
                Ok(RemoteLoad::Absent)
            }
        }
    }

    /// Save `columns` for `report_type`, debounced by `debounce`.
    ///
    /// A zero `debounce` writes immediately. Otherwise the call resolves
    /// once this write is sent, or as soon as a newer save for the same key
    /// supersedes it.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteUnavailable`] when the session lookup or the upsert
    /// fails.
    pub async fn save(
        &self,
        report_type: ReportType,
        columns: Vec<ColumnConfig>,
        user_id: Option<&UserId>,
        debounce: Duration,
    ) -> SaveResult {
        let Some(user_id) = self.resolve_user(user_id).await? else {
            debug!(%report_type, "no session; remote save declined");
            return Ok(RemoteSave::Declined);
        };

        if debounce.is_zero() {
            self.write(report_type, columns, &user_id).await?;
            return Ok(RemoteSave::Saved);
        }

        let receiver = self.schedule_write(report_type, columns, user_id, debounce)?;
        receiver.await.unwrap_or_else(|_| {
            Err(RemoteUnavailable::internal(
                "debounced save was dropped before completing",
            ))
        })
    }

    /// Issue a lightweight read against the backend.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteUnavailable`] when the table cannot be reached.
    pub async fn probe(&self) -> Result<(), RemoteUnavailable> {
        self.table.probe().await.map_err(RemoteUnavailable::from)
    }

    /// Number of debounced writes waiting for their timer.
    pub fn pending_writes(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    async fn resolve_user(
        &self,
        user_id: Option<&UserId>,
    ) -> Result<Option<UserId>, RemoteUnavailable> {
        match user_id {
            Some(user_id) => Ok(Some(user_id.clone())),
            None => Ok(self.sessions.current_user_id().await?),
        }
    }

    fn schedule_write(
        &self,
        report_type: ReportType,
        columns: Vec<ColumnConfig>,
        user_id: UserId,
        debounce: Duration,
    ) -> Result<oneshot::Receiver<SaveResult>, RemoteUnavailable> {
        let (waiter, receiver) = oneshot::channel();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let key = (user_id, report_type);

        // The map lock is held while spawning so the timer task cannot look
        // up its own entry before it has been inserted.
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| RemoteUnavailable::internal("debounce state poisoned"))?;

        if let Some(previous) = pending.remove(&key) {
            previous.timer.abort();
            debug!(%report_type, user_id = %key.0, "debounced save superseded");
            // The superseded caller may have gone away; nothing to report.
            let _ = previous.waiter.send(Ok(RemoteSave::Superseded));
        }

        let store = self.clone();
        let task_key = key.clone();
        let timer = tokio::spawn(async move {
            store.sleeper.sleep(debounce).await;
            let Some(waiter) = store.claim_pending(&task_key, generation) else {
                return;
            };
            let (user_id, report_type) = task_key;
            let result = store
                .write(report_type, columns, &user_id)
                .await
                .map(|()| RemoteSave::Saved);
            // The caller may have stopped waiting; the write still happened.
            let _ = waiter.send(result);
        })
        .abort_handle();

        pending.insert(
            key,
            PendingSave {
                generation,
                waiter,
                timer,
            },
        );
        Ok(receiver)
    }

    fn claim_pending(
        &self,
        key: &PendingKey,
        generation: u64,
    ) -> Option<oneshot::Sender<SaveResult>> {
        let mut pending = self.pending.lock().ok()?;
        if pending.get(key)?.generation != generation {
            return None;
        }
        pending.remove(key).map(|entry| entry.waiter)
    }

    async fn write(
        &self,
        report_type: ReportType,
        columns: Vec<ColumnConfig>,
        user_id: &UserId,
    ) -> Result<(), RemoteUnavailable> {
        let now = self.clock.utc();
        let preferences = TablePreferences::builder(report_type)
            .columns(columns)
            .user_id(Some(user_id.clone()))
            .updated_at(now)
            .build();
        let row = StoredPreferencesRow {
            user_id: user_id.clone(),
            report_type,
            preferences: preferences.to_payload(),
            updated_at: now,
        };
        self.table.upsert(&row).await?;
        self.cache.put(user_id, report_type, preferences);
        debug!(%report_type, %user_id, "remote preferences saved");
        Ok(())
    }
}

#[cfg(test)]
#[path = "remote_store_tests.rs"]
mod tests;
