//! Test utilities for the column-settings crate.
//!
//! This module provides shared helpers for both unit tests (in `src/`) and
//! integration tests (in `tests/`). It is compiled for unit tests and behind
//! the `test-support` feature.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;

use crate::domain::ports::{
    PreferencesTable, PreferencesTableError, SessionError, SessionProvider, StoredPreferencesRow,
};
use crate::domain::{ReportType, SettingsSleeper, UserId};

pub use crate::outbound::storage::InMemoryKeyValueStorage;

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("{name} mutex poisoned"),
    }
}

/// Clock frozen at a settable instant.
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => {
                panic!("failed to convert Duration to TimeDelta: {error}; delta={delta:?}")
            }
        };
        *lock(&self.0, "clock") += delta;
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *lock(&self.0, "clock")
    }
}

/// Sleeper that returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateSleeper;

#[async_trait]
impl SettingsSleeper for ImmediateSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

/// Sleeper that returns immediately and records every requested delay.
#[derive(Default)]
pub struct RecordingSleeper(Mutex<Vec<Duration>>);

impl RecordingSleeper {
    pub fn recorded(&self) -> Vec<Duration> {
        lock(&self.0, "sleeper").clone()
    }
}

#[async_trait]
impl SettingsSleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.0, "sleeper").push(duration);
    }
}

#[derive(Default)]
struct TableState {
    rows: HashMap<(UserId, ReportType), StoredPreferencesRow>,
    select_failure: Option<PreferencesTableError>,
    upsert_failure: Option<PreferencesTableError>,
    probe_failure: Option<PreferencesTableError>,
    selects: usize,
    upserts: Vec<StoredPreferencesRow>,
}

/// Preferences table held in memory with scriptable failures.
#[derive(Default)]
pub struct InMemoryPreferencesTable {
    state: Mutex<TableState>,
}

impl InMemoryPreferencesTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row without counting it as an upsert.
    pub fn insert_row(&self, row: StoredPreferencesRow) {
        let key = (row.user_id.clone(), row.report_type);
        lock(&self.state, "table").rows.insert(key, row);
    }

    pub fn row(&self, user_id: &UserId, report_type: ReportType) -> Option<StoredPreferencesRow> {
        lock(&self.state, "table")
            .rows
            .get(&(user_id.clone(), report_type))
            .cloned()
    }

    /// Make every read fail with `error` until [`Self::heal`] is called.
    pub fn fail_selects(&self, error: PreferencesTableError) {
        lock(&self.state, "table").select_failure = Some(error);
    }

    /// Make every write fail with `error` until [`Self::heal`] is called.
    pub fn fail_upserts(&self, error: PreferencesTableError) {
        lock(&self.state, "table").upsert_failure = Some(error);
    }

    /// Make health probes fail with `error` until [`Self::heal`] is called.
    pub fn fail_probes(&self, error: PreferencesTableError) {
        lock(&self.state, "table").probe_failure = Some(error);
    }

    /// Take the table offline for reads, writes and probes.
    pub fn go_offline(&self) {
        let error = PreferencesTableError::transport("connection refused");
        let mut state = lock(&self.state, "table");
        state.select_failure = Some(error.clone());
        state.upsert_failure = Some(error.clone());
        state.probe_failure = Some(error);
    }

    pub fn heal(&self) {
        let mut state = lock(&self.state, "table");
        state.select_failure = None;
        state.upsert_failure = None;
        state.probe_failure = None;
    }

    pub fn select_count(&self) -> usize {
        lock(&self.state, "table").selects
    }

    /// Every successful upsert, in call order.
    pub fn upserts(&self) -> Vec<StoredPreferencesRow> {
        lock(&self.state, "table").upserts.clone()
    }
}

#[async_trait]
impl PreferencesTable for InMemoryPreferencesTable {
    async fn select(
        &self,
        user_id: &UserId,
        report_type: ReportType,
    ) -> Result<Option<StoredPreferencesRow>, PreferencesTableError> {
        let mut state = lock(&self.state, "table");
        state.selects += 1;
        if let Some(error) = &state.select_failure {
            return Err(error.clone());
        }
        Ok(state.rows.get(&(user_id.clone(), report_type)).cloned())
    }

    async fn upsert(&self, row: &StoredPreferencesRow) -> Result<(), PreferencesTableError> {
        let mut state = lock(&self.state, "table");
        if let Some(error) = &state.upsert_failure {
            return Err(error.clone());
        }
        state.upserts.push(row.clone());
        state
            .rows
            .insert((row.user_id.clone(), row.report_type), row.clone());
        Ok(())
    }

    async fn probe(&self) -> Result<(), PreferencesTableError> {
        match &lock(&self.state, "table").probe_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Session provider whose answer can be changed mid-test.
pub struct ScriptedSessionProvider(Mutex<Result<Option<UserId>, SessionError>>);

impl ScriptedSessionProvider {
    pub fn signed_in(user_id: UserId) -> Self {
        Self(Mutex::new(Ok(Some(user_id))))
    }

    pub fn anonymous() -> Self {
        Self(Mutex::new(Ok(None)))
    }

    pub fn failing(error: SessionError) -> Self {
        Self(Mutex::new(Err(error)))
    }

    pub fn set(&self, outcome: Result<Option<UserId>, SessionError>) {
        *lock(&self.0, "session") = outcome;
    }
}

#[async_trait]
impl SessionProvider for ScriptedSessionProvider {
    async fn current_user_id(&self) -> Result<Option<UserId>, SessionError> {
        lock(&self.0, "session").clone()
    }
}
