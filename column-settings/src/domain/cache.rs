//! In-process TTL cache of loaded and saved preferences.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use tracing::{debug, warn};

use super::{ReportType, TablePreferences, UserId};

/// Default lifetime of a cache entry.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    preferences: TablePreferences,
    stored_at: DateTime<Utc>,
}

/// Time-bounded map keyed by `(user, report type)`.
///
/// Never a source of truth: entries vanish after the TTL, on explicit
/// clear, and when the process exits.
pub struct SettingsCache {
    entries: Mutex<HashMap<(UserId, ReportType), CacheEntry>>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl SettingsCache {
    /// Create an empty cache whose entries live for `ttl`.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            clock,
        }
    }

    /// Return the live entry for the key, evicting it when stale.
    pub fn get(&self, user_id: &UserId, report_type: ReportType) -> Option<TablePreferences> {
        let now = self.clock.utc();
        let Ok(mut entries) = self.entries.lock() else {
            warn!("settings cache mutex poisoned; treating as miss");
            return None;
        };
        let key = (user_id.clone(), report_type);
        let stored_at = entries.get(&key)?.stored_at;
        if now.signed_duration_since(stored_at) >= self.ttl {
            entries.remove(&key);
            debug!(%report_type, %user_id, "settings cache entry expired");
            return None;
        }
        debug!(%report_type, %user_id, "settings cache hit");
        entries.get(&key).map(|entry| entry.preferences.clone())
    }

    /// Store `preferences` under the key with a fresh timestamp.
    pub fn put(&self, user_id: &UserId, report_type: ReportType, preferences: TablePreferences) {
        let stored_at = self.clock.utc();
        let Ok(mut entries) = self.entries.lock() else {
            warn!("settings cache mutex poisoned; dropping write");
            return;
        };
        entries.insert(
            (user_id.clone(), report_type),
            CacheEntry {
                preferences,
                stored_at,
            },
        );
    }

    /// Evict one user's entry, or every entry for the report when `user_id`
    /// is `None`.
    pub fn clear(&self, report_type: ReportType, user_id: Option<&UserId>) {
        let Ok(mut entries) = self.entries.lock() else {
            warn!("settings cache mutex poisoned; clear skipped");
            return;
        };
        match user_id {
            Some(user_id) => {
                entries.remove(&(user_id.clone(), report_type));
            }
            None => entries.retain(|(_, report), _| *report != report_type),
        }
    }

    /// Number of entries currently held, including not-yet-evicted stale ones.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ColumnConfig;
    use crate::test_support::MutableClock;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    #[fixture]
    fn clock() -> Arc<MutableClock> {
        let start = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid time");
        Arc::new(MutableClock::new(start))
    }

    fn preferences(report_type: ReportType) -> TablePreferences {
        TablePreferences::builder(report_type)
            .columns(vec![ColumnConfig::new("date", 120, 0)])
            .build()
    }

    #[rstest]
    fn entry_is_served_until_ttl_elapses(clock: Arc<MutableClock>) {
        let cache = SettingsCache::new(DEFAULT_CACHE_TTL, clock.clone());
        let user = UserId::random();
        let prefs = preferences(ReportType::MainReport);
        cache.put(&user, ReportType::MainReport, prefs.clone());

        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get(&user, ReportType::MainReport), Some(prefs));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&user, ReportType::MainReport), None);
        assert!(cache.is_empty(), "stale entry evicted on access");
    }

    #[rstest]
    fn put_overwrites_and_refreshes_timestamp(clock: Arc<MutableClock>) {
        let cache = SettingsCache::new(DEFAULT_CACHE_TTL, clock.clone());
        let user = UserId::random();
        cache.put(&user, ReportType::MainReport, preferences(ReportType::MainReport));
        clock.advance(Duration::from_secs(200));

        let newer = TablePreferences::builder(ReportType::MainReport)
            .columns(vec![ColumnConfig::new("total", 90, 0)])
            .build();
        cache.put(&user, ReportType::MainReport, newer.clone());
        clock.advance(Duration::from_secs(200));

        assert_eq!(cache.get(&user, ReportType::MainReport), Some(newer));
        assert_eq!(cache.len(), 1);
    }

    #[rstest]
    fn clear_with_user_evicts_only_that_key(clock: Arc<MutableClock>) {
        let cache = SettingsCache::new(DEFAULT_CACHE_TTL, clock);
        let alice = UserId::random();
        let bob = UserId::random();
        cache.put(&alice, ReportType::MainReport, preferences(ReportType::MainReport));
        cache.put(&bob, ReportType::MainReport, preferences(ReportType::MainReport));

        cache.clear(ReportType::MainReport, Some(&alice));

        assert!(cache.get(&alice, ReportType::MainReport).is_none());
        assert!(cache.get(&bob, ReportType::MainReport).is_some());
    }

    #[rstest]
    fn clear_without_user_evicts_whole_report(clock: Arc<MutableClock>) {
        let cache = SettingsCache::new(DEFAULT_CACHE_TTL, clock);
        let alice = UserId::random();
        let bob = UserId::random();
        cache.put(&alice, ReportType::MainReport, preferences(ReportType::MainReport));
        cache.put(&bob, ReportType::MainReport, preferences(ReportType::MainReport));
        cache.put(
            &alice,
            ReportType::ProductsReport,
            preferences(ReportType::ProductsReport),
        );

        cache.clear(ReportType::MainReport, None);

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&alice, ReportType::ProductsReport).is_some());
    }
}
