//! Durable memory of the profile field.
//!
//! To give the profile back to its owner, we have to remember what it said
//! before we took it over. [`Record`] keeps two values:
//!
//! * `user_value`: the last text the user wrote, or a configured initial text
//! * `bot_value`: the last status we wrote
//!
//! The values live in a [`Store`], a small key-value interface so that the
//! storage can be swapped without touching the reconciliation logic.
//! [`JsonFile`] keeps them in a JSON document on disk:
//!
//! ```json
//! {
//!   "bot_value": "🎶 Now Playing: Song - A 1:05/3:05",
//!   "user_value": "hello world"
//! }
//! ```

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind as IoErrorKind,
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// Key-value storage for the [`Record`].
pub trait Store: Send {
    fn get(&self, key: &str) -> Option<String>;

    /// Sets a value in memory. Call [`Store::flush`] to persist it.
    fn set(&mut self, key: &str, value: String);

    /// Persists all values.
    ///
    /// # Errors
    ///
    /// Returns `DataLoss` if the values could not be persisted.
    fn flush(&mut self) -> Result<()>;
}

/// Volatile store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InMemory {
    values: BTreeMap<String, String>,
}

impl Store for InMemory {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.values.insert(key.to_owned(), value);
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Store backed by a JSON file.
///
/// The whole file is rewritten on flush, through a temporary file that is
/// renamed over the original so that a crash never leaves half a document.
#[derive(Clone, Debug)]
pub struct JsonFile {
    path: PathBuf,
    values: BTreeMap<String, String>,
    dirty: bool,
}

impl JsonFile {
    /// Opens the store at `path`.
    ///
    /// A missing file is an empty store; it is created on the first flush.
    ///
    /// # Errors
    ///
    /// Returns `DataLoss` if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let values = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                Error::data_loss(format!("{} is not a valid record: {e}", path.display()))
            })?,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                debug!("{} does not exist yet", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                return Err(Error::data_loss(format!(
                    "unable to read {}: {e}",
                    path.display()
                )))
            }
        };

        Ok(Self {
            path,
            values,
            dirty: false,
        })
    }

    /// Opens the store at `path`, or starts empty if it is unreadable.
    ///
    /// The unreadable file is left alone until the next flush replaces it.
    pub fn open_or_empty(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::open(&path).unwrap_or_else(|e| {
            error!("{e}; starting with an empty record");
            Self {
                path,
                values: BTreeMap::new(),
                dirty: false,
            }
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Store for JsonFile {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        if self.values.get(key) != Some(&value) {
            self.values.insert(key.to_owned(), value);
            self.dirty = true;
        }
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let contents = serde_json::to_string_pretty(&self.values)?;
        let temp = self.temp_path();
        fs::write(&temp, contents)
            .and_then(|()| fs::rename(&temp, &self.path))
            .map_err(|e| {
                Error::data_loss(format!("unable to write {}: {e}", self.path.display()))
            })?;

        self.dirty = false;
        trace!("flushed record to {}", self.path.display());
        Ok(())
    }
}

/// What the profile looked like before we wrote to it, and what we wrote.
pub struct Record {
    store: Box<dyn Store>,
    initial: String,
}

impl Record {
    pub const USER_VALUE: &'static str = "user_value";
    pub const BOT_VALUE: &'static str = "bot_value";

    /// Creates a record on top of `store`.
    ///
    /// `initial` stands in for the user's text until one has been seen.
    pub fn new(store: Box<dyn Store>, initial: impl Into<String>) -> Self {
        Self {
            store,
            initial: initial.into(),
        }
    }

    /// The text to restore when we give the profile back.
    #[must_use]
    pub fn user_value(&self) -> String {
        self.store
            .get(Self::USER_VALUE)
            .unwrap_or_else(|| self.initial.clone())
    }

    /// The last status we wrote, if any.
    #[must_use]
    pub fn bot_value(&self) -> Option<String> {
        self.store.get(Self::BOT_VALUE)
    }

    /// Remembers the user's text. Returns whether it changed.
    pub fn remember_user_value(&mut self, value: &str) -> bool {
        self.remember(Self::USER_VALUE, value)
    }

    /// Remembers the status we wrote. Returns whether it changed.
    pub fn remember_bot_value(&mut self, value: &str) -> bool {
        self.remember(Self::BOT_VALUE, value)
    }

    /// Sets and flushes a value.
    ///
    /// Flush failures are logged: the value is still remembered in memory
    /// and the next change tries to persist it again.
    fn remember(&mut self, key: &str, value: &str) -> bool {
        if self.store.get(key).as_deref() == Some(value) {
            return false;
        }

        self.store.set(key, value.to_owned());
        if let Err(e) = self.store.flush() {
            error!("{e}");
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_value_until_user_text_is_seen() {
        let mut record = Record::new(Box::new(InMemory::default()), "about me");
        assert_eq!(record.user_value(), "about me");
        assert_eq!(record.bot_value(), None);

        assert!(record.remember_user_value("hello world"));
        assert!(!record.remember_user_value("hello world"));
        assert_eq!(record.user_value(), "hello world");
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFile::open(dir.path().join("database.json")).unwrap();
        assert_eq!(store.get(Record::USER_VALUE), None);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.json");

        let mut record = Record::new(Box::new(JsonFile::open(&path).unwrap()), "");
        record.remember_user_value("hello world");
        record.remember_bot_value("🎶 : Song");

        let reopened = Record::new(Box::new(JsonFile::open(&path).unwrap()), "");
        assert_eq!(reopened.user_value(), "hello world");
        assert_eq!(reopened.bot_value().as_deref(), Some("🎶 : Song"));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["user_value"], "hello world");
        assert!(!dir.path().join("database.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_data_loss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.json");
        fs::write(&path, "{\"user_value\": ").unwrap();

        let error = JsonFile::open(&path).unwrap_err();
        assert_eq!(error.kind, crate::error::ErrorKind::DataLoss);

        let store = JsonFile::open_or_empty(&path);
        assert_eq!(store.get(Record::USER_VALUE), None);
    }

    #[test]
    fn unwritable_store_keeps_values_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("database.json");

        let mut record = Record::new(Box::new(JsonFile::open(&path).unwrap()), "");
        assert!(record.remember_user_value("hello world"));
        assert_eq!(record.user_value(), "hello world");
        assert!(!path.exists());
    }
}
