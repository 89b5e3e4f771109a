//! Port for device-local string key-value storage.

use super::define_port_error;

define_port_error! {
    /// Errors raised by device-local storage adapters.
    pub enum KeyValueStorageError {
        /// Storage is disabled, full, or otherwise unusable.
        Unavailable { message: String } =>
            "device storage unavailable: {message}",
        /// Reading or writing one key failed.
        Io { key: String, message: String } =>
            "device storage operation on {key} failed: {message}",
    }
}

/// Synchronous string key-value store local to the device.
///
/// Reads of missing keys return `Ok(None)`; removing a missing key succeeds.
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStorage: Send + Sync {
    /// Read the value stored under `key`.
    fn get_item(&self, key: &str) -> Result<Option<String>, KeyValueStorageError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> Result<(), KeyValueStorageError>;

    /// Delete `key` if present.
    fn remove_item(&self, key: &str) -> Result<(), KeyValueStorageError>;
}

/// Fixture storage that is always empty and discards writes.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureKeyValueStorage;

impl KeyValueStorage for FixtureKeyValueStorage {
    fn get_item(&self, _key: &str) -> Result<Option<String>, KeyValueStorageError> {
        Ok(None)
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<(), KeyValueStorageError> {
        Ok(())
    }

    fn remove_item(&self, _key: &str) -> Result<(), KeyValueStorageError> {
        Ok(())
    }
}
