//! PostgreSQL persistence for the preferences table.
//!
//! A direct-database alternative to the REST adapter, for deployments that
//! own the database. Row structs (`models.rs`) and the Diesel schema
//! (`schema.rs`) stay private to this module; connections come from a `bb8`
//! pool of `diesel-async` connections.
//!
//! # Example
//!
//! ```ignore
//! use column_settings::outbound::persistence::{DbPool, DieselPreferencesTable, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/settings")).await?;
//! let table = DieselPreferencesTable::new(pool);
//! ```

mod diesel_preferences_table;
mod models;
mod pool;
mod schema;

pub use diesel_preferences_table::DieselPreferencesTable;
pub use pool::{DbPool, PoolConfig, PoolError};
