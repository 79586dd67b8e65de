//! Durable storage for the bearer-token session.
//!
//! The session lives in a single slot as one camelCase JSON record. Every
//! other component goes through [`TokenStore`]; only this module knows how
//! the record is encoded and what the slot is backed by.

use std::error::Error as StdError;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::api::{TokenResponse, UserIdentity};

pub type SlotResult<T> = Result<T, Box<dyn StdError + Send + Sync>>;

/// A single durable string value.
pub trait SessionSlot: Send + Sync {
    fn read(&self) -> SlotResult<Option<String>>;
    fn write(&self, value: &str) -> SlotResult<()>;
    fn remove(&self) -> SlotResult<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, with = "crate::utils::time::optional")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: Option<UserIdentity>,
}

impl Session {
    pub fn is_logged_in(&self) -> bool {
        self.access_token.is_some() && self.user.is_some()
    }

    fn apply(&mut self, patch: SessionPatch) {
        if let Some(access_token) = patch.access_token {
            self.access_token = Some(access_token);
        }
        if let Some(refresh_token) = patch.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        if let Some(expires_at) = patch.expires_at {
            self.expires_at = Some(expires_at);
        }
        if let Some(user) = patch.user {
            self.user = Some(user);
        }
    }
}

/// Fields to merge into the stored session; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: Option<UserIdentity>,
}

impl SessionPatch {
    /// Everything a login or register response carries.
    pub fn from_token_response(tokens: &TokenResponse) -> Self {
        Self {
            user: Some(tokens.user.clone()),
            ..Self::tokens_only(tokens)
        }
    }

    /// Credentials from a refresh; the stored identity stays as is.
    pub fn tokens_only(tokens: &TokenResponse) -> Self {
        Self {
            access_token: Some(tokens.access_token.clone()),
            refresh_token: Some(tokens.refresh_token.clone()),
            expires_at: tokens.expires_at,
            user: None,
        }
    }

    pub fn user(user: UserIdentity) -> Self {
        Self {
            user: Some(user),
            ..Self::default()
        }
    }
}

pub struct TokenStore {
    slot: Box<dyn SessionSlot>,
    lock: Mutex<()>,
}

impl TokenStore {
    pub fn new(slot: impl SessionSlot + 'static) -> Self {
        Self {
            slot: Box::new(slot),
            lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemorySlot::default())
    }

    /// The persisted session, or `None` when nothing usable is stored.
    pub fn load(&self) -> Option<Session> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_unlocked()
    }

    pub fn save(&self, patch: SessionPatch) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut session = self.read_unlocked().unwrap_or_default();
        session.apply(patch);
        self.write_unlocked(&session);
    }

    /// Merge `patch` only while the stored refresh token is still `expected`.
    /// Returns whether the patch was written.
    pub fn save_if_refresh_token(&self, expected: &str, patch: SessionPatch) -> bool {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(mut session) = self.read_unlocked() else {
            return false;
        };
        if session.refresh_token.as_deref() != Some(expected) {
            return false;
        }
        session.apply(patch);
        self.write_unlocked(&session);
        true
    }

    pub fn clear(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = self.slot.remove() {
            warn!(error = %err, "Failed to clear stored session");
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.load().and_then(|session| session.access_token)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.load().and_then(|session| session.refresh_token)
    }

    fn write_unlocked(&self, session: &Session) {
        let encoded = match serde_json::to_string(session) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(error = %err, "Failed to encode session");
                return;
            }
        };
        if let Err(err) = self.slot.write(&encoded) {
            warn!(error = %err, "Failed to persist session");
        }
    }

    fn read_unlocked(&self) -> Option<Session> {
        let raw = match self.slot.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "Failed to read stored session");
                return None;
            }
        };
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Some(session),
            Err(err) => {
                debug!(error = %err, "Ignoring corrupt stored session");
                None
            }
        }
    }
}

/// Process-local slot. Clones share the same value.
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    value: Arc<Mutex<Option<String>>>,
}

impl MemorySlot {
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Arc::new(Mutex::new(Some(value.into()))),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionSlot for MemorySlot {
    fn read(&self) -> SlotResult<Option<String>> {
        Ok(self.raw())
    }

    fn write(&self, value: &str) -> SlotResult<()> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(value.to_string());
        Ok(())
    }

    fn remove(&self) -> SlotResult<()> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// JSON file slot, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `session.json` in the per-user data directory.
    pub fn default_location() -> Option<Self> {
        ProjectDirs::from("org", "chatwire", "chatwire")
            .map(|dirs| Self::new(dirs.data_dir().join("session.json")))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl SessionSlot for FileSlot {
    fn read(&self) -> SlotResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Box::new(err)),
        }
    }

    fn write(&self, value: &str) -> SlotResult<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;
        let mut temp = NamedTempFile::new_in(&parent)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }

    fn remove(&self) -> SlotResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Box::new(err)),
        }
    }
}
