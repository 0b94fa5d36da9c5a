//! String key-value store for the auth token and small cached values.

use crate::store::{read_locked, with_lock, write_atomic};
use crate::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Key holding the API bearer token
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Minimal persistent map of string keys to string values
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;

    fn auth_token(&self) -> Result<Option<String>> {
        self.get(AUTH_TOKEN_KEY)
    }

    fn set_auth_token(&mut self, token: &str) -> Result<()> {
        self.set(AUTH_TOKEN_KEY, token)
    }

    fn clear_auth_token(&mut self) -> Result<()> {
        self.remove(AUTH_TOKEN_KEY)
    }
}

/// In-memory store
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk
///
/// Every call re-reads the file so separate processes see each other's
/// writes. Writes hold the store's lock from read to atomic replace.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = read_locked(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let contents = serde_json::to_vec_pretty(entries)?;
        write_atomic(&self.path, &contents)
    }

    /// Replace the value at `key` with `f(current)` under the store lock
    ///
    /// `None` from `f` removes the key. Returns the new value.
    pub fn update<F>(&mut self, key: &str, f: F) -> Result<Option<String>>
    where
        F: FnOnce(Option<String>) -> Result<Option<String>>,
    {
        with_lock(&self.path, || {
            let mut entries = self.read_all()?;
            let current = entries.get(key).cloned();
            let next = f(current.clone())?;
            if next == current {
                return Ok(next);
            }

            match &next {
                Some(value) => {
                    entries.insert(key.to_string(), value.clone());
                }
                None => {
                    entries.remove(key);
                }
            }
            self.write_all(&entries)?;
            Ok(next)
        })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.update(key, |_| Ok(Some(value.to_string())))?;
        tracing::debug!("Stored key {}", key);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.update(key, |_| Ok(None))?;
        tracing::debug!("Removed key {}", key);
        Ok(())
    }
}
