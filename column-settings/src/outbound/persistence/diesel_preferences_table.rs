//! PostgreSQL-backed `PreferencesTable` implementation using Diesel ORM.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use tracing::debug;

use crate::domain::ports::{PreferencesTable, PreferencesTableError, StoredPreferencesRow};
use crate::domain::{ReportType, UserId};

use super::models::{NewTablePreferencesRow, TablePreferencesRow};
use super::pool::{DbPool, PoolError};
use super::schema::table_preferences;

/// Diesel-backed preferences table.
///
/// Upserts rely on the `(user_id, report_type)` primary key: a conflicting
/// insert replaces the payload and timestamp of the existing row.
#[derive(Clone)]
pub struct DieselPreferencesTable {
    pool: DbPool,
}

impl DieselPreferencesTable {
    /// Create a table adapter over `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> PreferencesTableError {
    PreferencesTableError::connection(error.into_message())
}

fn map_diesel_error(error: diesel::result::Error) -> PreferencesTableError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            PreferencesTableError::connection("database connection error")
        }
        DieselError::DeserializationError(inner) => {
            PreferencesTableError::decode(inner.to_string())
        }
        DieselError::NotFound => PreferencesTableError::query("record not found"),
        _ => PreferencesTableError::query("database error"),
    }
}

fn row_to_stored(row: TablePreferencesRow) -> Result<StoredPreferencesRow, PreferencesTableError> {
    let report_type = row
        .report_type
        .parse::<ReportType>()
        .map_err(|error| PreferencesTableError::decode(error.to_string()))?;
    Ok(StoredPreferencesRow {
        user_id: UserId::from_uuid(row.user_id),
        report_type,
        preferences: row.preferences,
        updated_at: row.updated_at,
    })
}

#[async_trait]
impl PreferencesTable for DieselPreferencesTable {
    async fn select(
        &self,
        user_id: &UserId,
        report_type: ReportType,
    ) -> Result<Option<StoredPreferencesRow>, PreferencesTableError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<TablePreferencesRow> = table_preferences::table
            .filter(table_preferences::user_id.eq(user_id.as_uuid()))
            .filter(table_preferences::report_type.eq(report_type.as_str()))
            .select(TablePreferencesRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(row_to_stored).transpose()
    }

    async fn upsert(&self, row: &StoredPreferencesRow) -> Result<(), PreferencesTableError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let new_row = NewTablePreferencesRow {
            user_id: *row.user_id.as_uuid(),
            report_type: row.report_type.as_str(),
            preferences: &row.preferences,
            updated_at: row.updated_at,
        };

        diesel::insert_into(table_preferences::table)
            .values(&new_row)
            .on_conflict((table_preferences::user_id, table_preferences::report_type))
            .do_update()
            .set((
                table_preferences::preferences.eq(excluded(table_preferences::preferences)),
                table_preferences::updated_at.eq(excluded(table_preferences::updated_at)),
            ))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn probe(&self) -> Result<(), PreferencesTableError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        table_preferences::table
            .select(table_preferences::user_id)
            .limit(1)
            .load::<uuid::Uuid>(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }
}
