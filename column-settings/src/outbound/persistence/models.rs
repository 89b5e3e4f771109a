//! Internal Diesel row structs for the `table_preferences` table.
//!
//! These types never leave the persistence layer.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::table_preferences;

/// Row read from `table_preferences`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = table_preferences)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct TablePreferencesRow {
    pub user_id: Uuid,
    pub report_type: String,
    pub preferences: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Row written to `table_preferences`.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = table_preferences)]
pub(crate) struct NewTablePreferencesRow<'a> {
    pub user_id: Uuid,
    pub report_type: &'a str,
    pub preferences: &'a serde_json::Value,
    pub updated_at: DateTime<Utc>,
}
