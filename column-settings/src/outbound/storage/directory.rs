//! `KeyValueStorage` persisted as one file per key.
//!
//! All file access goes through a `cap_std::fs::Dir` opened once at
//! construction, so keys can never address anything outside the storage
//! directory. Keys are encoded into file names: ASCII letters, digits, `-`
//! and `_` pass through and every other byte becomes `%XX`. Writes land in a
//! staging file first and are renamed into place.

use std::io;
use std::path::{Path, PathBuf};

use cap_std::{ambient_authority, fs::Dir};
use tracing::debug;
use uuid::Uuid;

use crate::domain::ports::{KeyValueStorage, KeyValueStorageError};

const VALUE_EXTENSION: &str = "value";

/// Device-local storage rooted at one directory.
#[derive(Debug)]
pub struct DirectoryKeyValueStorage {
    root: PathBuf,
    dir: Dir,
}

impl DirectoryKeyValueStorage {
    /// Open (creating if needed) the storage directory at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyValueStorageError::Unavailable`] when the directory cannot
    /// be created or opened.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, KeyValueStorageError> {
        let root = root.as_ref().to_path_buf();
        Dir::create_ambient_dir_all(&root, ambient_authority())
            .and_then(|()| Dir::open_ambient_dir(&root, ambient_authority()))
            .map(|dir| Self {
                root: root.clone(),
                dir,
            })
            .map_err(|error| {
                KeyValueStorageError::unavailable(format!("{}: {error}", root.display()))
            })
    }

    /// Directory holding the stored values.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl KeyValueStorage for DirectoryKeyValueStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, KeyValueStorageError> {
        match self.dir.read_to_string(file_name(key)) {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(io_error(key, &error)),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), KeyValueStorageError> {
        let target = file_name(key);
        let staging = format!(".tmp-{}", Uuid::new_v4().simple());
        self.dir
            .write(&staging, value.as_bytes())
            .and_then(|()| self.dir.rename(&staging, &self.dir, &target))
            .map_err(|error| {
                if let Err(cleanup) = self.dir.remove_file(&staging) {
                    debug!(key, error = %cleanup, "staging file cleanup failed");
                }
                io_error(key, &error)
            })
    }

    fn remove_item(&self, key: &str) -> Result<(), KeyValueStorageError> {
        match self.dir.remove_file(file_name(key)) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(io_error(key, &error)),
        }
    }
}

fn io_error(key: &str, error: &io::Error) -> KeyValueStorageError {
    KeyValueStorageError::io(key, error.to_string())
}

fn file_name(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len() + VALUE_EXTENSION.len() + 1);
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded.push('.');
    encoded.push_str(VALUE_EXTENSION);
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn storage() -> (TempDir, DirectoryKeyValueStorage) {
        let temp = TempDir::new().expect("temp dir");
        let storage = DirectoryKeyValueStorage::open(temp.path().join("settings"))
            .expect("open storage");
        (temp, storage)
    }

    #[rstest]
    #[case::plain("table_settings_MAIN_REPORT", "table_settings_MAIN_REPORT.value")]
    #[case::separator("a/b", "a%2Fb.value")]
    #[case::traversal("../escape", "%2E%2E%2Fescape.value")]
    #[case::space("two words", "two%20words.value")]
    fn keys_encode_to_flat_file_names(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(file_name(key), expected);
    }

    #[test]
    fn values_survive_reopening_the_directory() {
        let (temp, storage) = storage();
        storage
            .set_item("table_settings_backup_MAIN_REPORT_anonymous", "{\"v\":1}")
            .expect("write");
        drop(storage);

        let reopened =
            DirectoryKeyValueStorage::open(temp.path().join("settings")).expect("reopen");
        assert_eq!(
            reopened
                .get_item("table_settings_backup_MAIN_REPORT_anonymous")
                .expect("read"),
            Some("{\"v\":1}".to_owned())
        );
    }

    #[test]
    fn missing_keys_read_as_none_and_remove_cleanly() {
        let (_temp, storage) = storage();
        assert_eq!(storage.get_item("absent").expect("read"), None);
        storage.remove_item("absent").expect("remove missing");

        storage.set_item("present", "x").expect("write");
        storage.remove_item("present").expect("remove");
        assert_eq!(storage.get_item("present").expect("read"), None);
    }

    #[test]
    fn traversal_keys_stay_inside_the_directory() {
        let (temp, storage) = storage();
        storage.set_item("../outside", "x").expect("write");

        let parent = Dir::open_ambient_dir(temp.path(), ambient_authority()).expect("open temp");
        assert!(!parent.exists("outside"));
        let root = Dir::open_ambient_dir(storage.root(), ambient_authority()).expect("open root");
        assert!(root.exists("%2E%2E%2Foutside.value"));
    }
}
