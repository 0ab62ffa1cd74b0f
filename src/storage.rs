//! Persistent session storage
//!
//! `KeyValueStore` is the durable key/value medium (the browser's
//! localStorage in a web shell, a JSON file on a desktop). Multi-key
//! operations are applied under a single lock so the credential pair and
//! user are always written, read and removed together.
//!
//! `SessionStorage` is the typed view over the three session keys. Only
//! the session manager holds one.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::auth::{CredentialPair, SessionUser};
use crate::error::StorageError;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_KEY: &str = "user";

const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY];

pub trait KeyValueStore: Send + Sync {
    /// Read several keys as one consistent snapshot
    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StorageError>;

    /// Write all entries or none
    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StorageError>;

    /// Remove the keys; returns how many were present
    fn remove_many(&self, keys: &[&str]) -> Result<usize, StorageError>;

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get_many(&[key])?.pop().flatten())
    }
}

/// In-process store. Lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(keys.iter().map(|key| entries.get(*key).cloned()).collect())
    }

    fn set_many(&self, items: &[(&str, String)]) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        for (key, value) in items {
            entries.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<usize, StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(keys
            .iter()
            .filter(|key| entries.remove(**key).is_some())
            .count())
    }
}

/// Store backed by a JSON object on disk.
///
/// The file is read once when opened; every mutation rewrites it through a
/// temporary file and a rename, so a crash never leaves half a session.
/// On unix the file is created with 0600 permissions.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            HashMap::new()
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Session store opened");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = serde_json::to_string_pretty(entries)?;
        let tmp_path = self.path.with_extension("tmp");

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&tmp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(keys.iter().map(|key| entries.get(*key).cloned()).collect())
    }

    fn set_many(&self, items: &[(&str, String)]) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        let mut updated = entries.clone();
        for (key, value) in items {
            updated.insert((*key).to_string(), value.clone());
        }
        // Memory only changes once the file write went through
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<usize, StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        let mut updated = entries.clone();
        let removed = keys
            .iter()
            .filter(|key| updated.remove(**key).is_some())
            .count();
        if removed > 0 {
            self.persist(&updated)?;
            *entries = updated;
        }
        Ok(removed)
    }
}

/// Typed access to the session keys
#[derive(Clone)]
pub struct SessionStorage {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStorage {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn access_token(&self) -> Result<Option<String>, StorageError> {
        self.store.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StorageError> {
        self.store.get(REFRESH_TOKEN_KEY)
    }

    /// Both tokens, or nothing if either is missing
    pub fn credentials(&self) -> Result<Option<CredentialPair>, StorageError> {
        let mut values = self
            .store
            .get_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])?
            .into_iter();
        match (values.next().flatten(), values.next().flatten()) {
            (Some(access), Some(refresh)) => Ok(Some(CredentialPair::new(access, refresh))),
            _ => Ok(None),
        }
    }

    /// The stored user. A record that no longer parses counts as absent.
    pub fn user(&self) -> Result<Option<SessionUser>, StorageError> {
        let Some(raw) = self.store.get(USER_KEY)? else {
            return Ok(None);
        };

        match serde_json::from_str::<SessionUser>(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                tracing::warn!(error = %e, "Stored session user is unreadable");
                Ok(None)
            }
        }
    }

    pub fn save_session(
        &self,
        credentials: &CredentialPair,
        user: &SessionUser,
    ) -> Result<(), StorageError> {
        let user_json = serde_json::to_string(user)?;
        self.store.set_many(&[
            (ACCESS_TOKEN_KEY, credentials.access_token.clone()),
            (REFRESH_TOKEN_KEY, credentials.refresh_token.clone()),
            (USER_KEY, user_json),
        ])
    }

    /// Replace the access token after a refresh. The refresh token only
    /// changes when the server rotated it.
    pub fn replace_access_token(
        &self,
        access_token: &str,
        rotated_refresh_token: Option<&str>,
    ) -> Result<(), StorageError> {
        match rotated_refresh_token {
            Some(refresh) => self.store.set_many(&[
                (ACCESS_TOKEN_KEY, access_token.to_string()),
                (REFRESH_TOKEN_KEY, refresh.to_string()),
            ]),
            None => self
                .store
                .set_many(&[(ACCESS_TOKEN_KEY, access_token.to_string())]),
        }
    }

    /// Remove every session key; true if anything was there
    pub fn clear(&self) -> Result<bool, StorageError> {
        Ok(self.store.remove_many(&SESSION_KEYS)? > 0)
    }
}
