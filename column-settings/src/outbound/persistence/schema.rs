//! Diesel table definitions; must match `column-settings/migrations/`.

diesel::table! {
    /// One column-settings payload per user and report.
    table_preferences (user_id, report_type) {
        /// Owning user (UUID).
        user_id -> Uuid,
        /// `MAIN_REPORT` or `PRODUCTS_REPORT`.
        report_type -> Varchar,
        /// Serialised `TablePreferences`; validated by the domain on read.
        preferences -> Jsonb,
        /// Last write instant.
        updated_at -> Timestamptz,
    }
}
