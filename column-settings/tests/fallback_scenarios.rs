//! End-to-end behaviour of the settings fallback chain over in-memory and
//! on-disk adapters.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use column_settings::domain::ports::{KeyValueStorage, PreferencesTableError};
use column_settings::domain::{
    ColumnConfig, HealthStatus, LocalBackupStore, OrchestratorConfig, ReportType,
    SettingsOrchestrator, SettingsPorts, SettingsRuntime, SettingsSleeper, SettingsSource,
    TablePreferences, TokioSleeper, UserId, backup_key,
};
use column_settings::outbound::storage::DirectoryKeyValueStorage;
use column_settings::test_support::{
    InMemoryKeyValueStorage, InMemoryPreferencesTable, MutableClock, RecordingSleeper,
    ScriptedSessionProvider,
};
use mockable::Clock;
use rstest::{fixture, rstest};
use tempfile::TempDir;

const HOUR: Duration = Duration::from_secs(60 * 60);

struct World {
    table: Arc<InMemoryPreferencesTable>,
    sessions: Arc<ScriptedSessionProvider>,
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<MutableClock>,
    user: UserId,
    orchestrator: Arc<SettingsOrchestrator>,
}

impl World {
    fn build(storage: Arc<dyn KeyValueStorage>, sleeper: Arc<dyn SettingsSleeper>, debounce: Duration) -> Self {
        let start = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid time");
        let clock = Arc::new(MutableClock::new(start));
        let user = UserId::random();
        let table = Arc::new(InMemoryPreferencesTable::new());
        let sessions = Arc::new(ScriptedSessionProvider::signed_in(user.clone()));
        let orchestrator = SettingsOrchestrator::with_runtime(
            SettingsPorts::new(table.clone(), sessions.clone(), Arc::clone(&storage)),
            SettingsRuntime {
                clock: clock.clone(),
                sleeper,
            },
            OrchestratorConfig {
                debounce,
                ..OrchestratorConfig::default()
            },
        );
        Self {
            table,
            sessions,
            storage,
            clock,
            user,
            orchestrator: Arc::new(orchestrator),
        }
    }

    fn backup_store(&self) -> LocalBackupStore {
        LocalBackupStore::new(Arc::clone(&self.storage), self.clock.clone())
    }
}

#[fixture]
fn world() -> World {
    World::build(
        Arc::new(InMemoryKeyValueStorage::new()),
        Arc::new(RecordingSleeper::default()),
        Duration::ZERO,
    )
}

fn product_columns() -> Vec<ColumnConfig> {
    vec![
        ColumnConfig::new("name", 150, 0),
        ColumnConfig::new("price", 80, 1).with_visible(false),
    ]
}

#[rstest]
#[tokio::test]
async fn happy_path_save_then_load(world: World) {
    let saved = world
        .orchestrator
        .save_with_fallback(ReportType::ProductsReport, product_columns(), None)
        .await;
    assert!(saved.success);
    assert_eq!(saved.source, SettingsSource::Database);

    let loaded = world
        .orchestrator
        .load_with_fallback(ReportType::ProductsReport)
        .await;
    assert!(loaded.success);
    assert_eq!(loaded.source, SettingsSource::Database);
    assert!(loaded.warnings.is_empty());
    assert_eq!(loaded.data.expect("settings").columns, product_columns());
}

#[rstest]
#[tokio::test]
async fn remote_down_with_recent_backup(world: World) {
    let backup = TablePreferences::builder(ReportType::MainReport)
        .columns(vec![ColumnConfig::new("date", 140, 0)])
        .user_id(Some(world.user.clone()))
        .updated_at(world.clock.utc())
        .build();
    world
        .backup_store()
        .write_backup(ReportType::MainReport, Some(&world.user), &backup)
        .expect("seed backup");
    world.clock.advance(HOUR);
    world
        .table
        .fail_selects(PreferencesTableError::transport("connection refused"));

    let loaded = world
        .orchestrator
        .load_with_fallback(ReportType::MainReport)
        .await;

    assert!(loaded.success);
    assert_eq!(loaded.source, SettingsSource::Backup);
    assert!(loaded.warnings.iter().any(|warning| warning.contains("backed-up")));
    assert!(!loaded.recovery_actions.is_empty());
    assert_eq!(world.orchestrator.pending_background_tasks(), 1);
}

#[tokio::test]
async fn first_anonymous_save_is_durable_on_disk() {
    let temp = TempDir::new().expect("temp dir");
    let storage = Arc::new(
        DirectoryKeyValueStorage::open(temp.path().join("storage")).expect("open storage"),
    );
    let world = World::build(storage, Arc::new(RecordingSleeper::default()), Duration::ZERO);
    world.sessions.set(Ok(None));
    let columns = vec![
        ColumnConfig::new("date", 120, 0),
        ColumnConfig::new("total", 110, 1),
        ColumnConfig::new("status", 90, 2),
    ];

    let saved = world
        .orchestrator
        .save_with_fallback(ReportType::MainReport, columns.clone(), None)
        .await;

    assert!(saved.success);
    assert!(saved.data);
    assert_eq!(saved.source, SettingsSource::LocalStorage);
    assert!(saved.warnings.iter().any(|warning| warning.contains("did not reach the server")));
    assert!(world.table.upserts().is_empty());

    let reopened =
        DirectoryKeyValueStorage::open(temp.path().join("storage")).expect("reopen storage");
    let raw = reopened
        .get_item(&backup_key(ReportType::MainReport, None))
        .expect("read backup")
        .expect("backup present");
    assert!(raw.contains("\"status\""));
}

#[rstest]
#[tokio::test]
async fn stale_backup_falls_through_to_defaults(world: World) {
    let backup = TablePreferences::builder(ReportType::MainReport)
        .columns(vec![ColumnConfig::new("date", 140, 0)])
        .user_id(Some(world.user.clone()))
        .updated_at(world.clock.utc())
        .build();
    world
        .backup_store()
        .write_backup(ReportType::MainReport, Some(&world.user), &backup)
        .expect("seed backup");
    world.clock.advance(30 * HOUR);

    let loaded = world
        .orchestrator
        .load_with_fallback(ReportType::MainReport)
        .await;

    assert!(loaded.success);
    assert_eq!(loaded.source, SettingsSource::Defaults);
    assert!(loaded.data.is_none());
    assert!(loaded.warnings.iter().any(|warning| warning.contains("No saved")));
}

#[tokio::test(start_paused = true)]
async fn rapid_saves_coalesce_into_one_write() {
    let world = World::build(
        Arc::new(InMemoryKeyValueStorage::new()),
        Arc::new(TokioSleeper),
        Duration::from_millis(1_000),
    );

    let mut handles = Vec::new();
    for width in [101, 102, 103, 104, 105] {
        let orchestrator = Arc::clone(&world.orchestrator);
        handles.push(tokio::spawn(async move {
            orchestrator
                .save_with_fallback(
                    ReportType::MainReport,
                    vec![ColumnConfig::new("date", width, 0)],
                    None,
                )
                .await
        }));
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
    for handle in handles {
        let result = handle.await.expect("save task");
        assert!(result.success);
        assert_eq!(result.source, SettingsSource::Database);
    }
    world.orchestrator.shutdown().await;

    let upserts = world.table.upserts();
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0].preferences["columns"][0]["width"], 105);
}

#[rstest]
#[tokio::test]
async fn health_is_degraded_when_only_the_database_is_down(world: World) {
    world.table.go_offline();

    let report = world.orchestrator.perform_health_check().await;

    assert_eq!(report.overall, HealthStatus::Degraded);
    assert!(!report.database);
    assert!(report.cache);
    assert!(report.local_storage);
    assert!(report.user);
    assert!(report.issues.iter().any(|issue| issue.contains("Database")));
}

#[rstest]
#[tokio::test]
async fn reset_twice_leaves_the_same_defaults(world: World) {
    let first = world
        .orchestrator
        .reset_to_defaults(ReportType::ProductsReport)
        .await;
    let second = world
        .orchestrator
        .reset_to_defaults(ReportType::ProductsReport)
        .await;
    assert!(first.success && second.success);

    let rows = world.table.upserts();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].preferences["columns"], rows[1].preferences["columns"]);
    let resolved = world
        .orchestrator
        .resolve_columns(ReportType::ProductsReport)
        .await;
    assert_eq!(
        resolved.data,
        column_settings::domain::default_columns(ReportType::ProductsReport)
    );
}
