//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod key_value_storage;
mod preferences_table;
mod session_provider;

#[cfg(test)]
pub use key_value_storage::MockKeyValueStorage;
pub use key_value_storage::{FixtureKeyValueStorage, KeyValueStorage, KeyValueStorageError};
#[cfg(test)]
pub use preferences_table::MockPreferencesTable;
pub use preferences_table::{
    FixturePreferencesTable, PreferencesTable, PreferencesTableError, StoredPreferencesRow,
};
#[cfg(test)]
pub use session_provider::MockSessionProvider;
pub use session_provider::{FixtureSessionProvider, SessionError, SessionProvider};
