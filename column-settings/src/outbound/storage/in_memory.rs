//! Process-local `KeyValueStorage` backed by a mutex-guarded map.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::ports::{KeyValueStorage, KeyValueStorageError};

/// Key-value storage that lives for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryKeyValueStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn poisoned() -> KeyValueStorageError {
        KeyValueStorageError::unavailable("in-memory storage lock poisoned")
    }
}

impl KeyValueStorage for InMemoryKeyValueStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, KeyValueStorageError> {
        let entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), KeyValueStorageError> {
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), KeyValueStorageError> {
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_replaces_and_removes_values() {
        let storage = InMemoryKeyValueStorage::new();
        storage.set_item("b", "1").expect("write");
        storage.set_item("a", "2").expect("write");
        storage.set_item("b", "3").expect("overwrite");

        assert_eq!(storage.get_item("b").expect("read"), Some("3".to_owned()));
        assert_eq!(storage.keys(), vec!["a".to_owned(), "b".to_owned()]);

        storage.remove_item("b").expect("remove");
        storage.remove_item("missing").expect("removing a missing key succeeds");
        assert_eq!(storage.get_item("b").expect("read"), None);
    }
}
