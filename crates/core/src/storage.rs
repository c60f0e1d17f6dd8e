use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

pub const TOKEN_KEY: &str = "token";
pub const IS_AUTHENTICATED_KEY: &str = "isAuthenticated";
pub const AUTH_DATA_KEY: &str = "authData";
pub const APP_VERSION_KEY: &str = "appVersion";
pub const COOKIE_CONSENT_KEY: &str = "cookieConsent";

/// Keys removed by a logout. `appVersion` and `cookieConsent` survive it.
pub const SESSION_KEYS: [&str; 3] = [TOKEN_KEY, IS_AUTHENTICATED_KEY, AUTH_DATA_KEY];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not read storage file `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not write storage file `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("storage file `{path}` is not a valid key-value document: {source}")]
    Corrupt { path: PathBuf, source: serde_json::Error },
    #[error("could not serialize storage entries: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Persistent string key-value store shared by the session monitor and the
/// quotation wizard.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

impl<S> Storage for Arc<S>
where
    S: Storage + ?Sized,
{
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }

    fn clear(&self) -> Result<(), StorageError> {
        (**self).clear()
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryStorage {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl InMemoryStorage {
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries.into_iter().map(|(key, value)| (key.into(), value.into())).collect();
        Self { entries: Arc::new(Mutex::new(map)) }
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn with_entries_mut<T>(&self, apply: impl FnOnce(&mut BTreeMap<String, String>) -> T) -> T {
        match self.entries.lock() {
            Ok(mut entries) => apply(&mut entries),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }
}

impl Storage for InMemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.with_entries_mut(|entries| entries.get(key).cloned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.with_entries_mut(|entries| entries.insert(key.to_string(), value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.with_entries_mut(|entries| entries.remove(key));
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.with_entries_mut(BTreeMap::clear);
        Ok(())
    }
}

/// JSON document on disk holding every key. Each write rewrites the whole
/// file; the lock serialises writers within one process only.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let raw = fs::read_to_string(&self.path)
            .map_err(|source| StorageError::Read { path: self.path.clone(), source })?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&raw)
            .map_err(|source| StorageError::Corrupt { path: self.path.clone(), source })
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| StorageError::Write { path: self.path.clone(), source })?;
        }

        let raw = serde_json::to_string_pretty(entries).map_err(StorageError::Serialize)?;
        fs::write(&self.path, raw)
            .map_err(|source| StorageError::Write { path: self.path.clone(), source })
    }

    fn update<T>(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>) -> T,
    ) -> Result<T, StorageError> {
        let _guard = match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut entries = self.read_entries()?;
        let result = apply(&mut entries);
        self.write_entries(&entries)?;
        Ok(result)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(self.read_entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.update(BTreeMap::clear)
    }
}
