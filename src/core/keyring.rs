use std::error::Error;
use std::fmt;

use keyring::Entry;

use crate::core::token_store::{SessionSlot, SlotResult};

const KEYRING_SERVICE: &str = "chatwire";

/// Describes failures when attempting to access the system keyring.
///
/// Recoverable errors mean the credential backend was temporarily
/// unavailable (a locked keychain, a missing secret service); permanent
/// errors carry the underlying cause unchanged.
#[derive(Debug)]
pub enum KeyringAccessError {
    Recoverable(keyring::Error),
    Permanent(keyring::Error),
}

impl KeyringAccessError {
    fn inner(&self) -> &keyring::Error {
        match self {
            KeyringAccessError::Recoverable(err) | KeyringAccessError::Permanent(err) => err,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, KeyringAccessError::Recoverable(_))
    }
}

impl From<keyring::Error> for KeyringAccessError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
                KeyringAccessError::Recoverable(err)
            }
            other => KeyringAccessError::Permanent(other),
        }
    }
}

impl fmt::Display for KeyringAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_recoverable() {
            write!(f, "keyring temporarily unavailable: {}", self.inner())
        } else {
            write!(f, "{}", self.inner())
        }
    }
}

impl Error for KeyringAccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner())
    }
}

/// Session slot stored as one keyring secret per backend.
#[derive(Debug, Clone)]
pub struct KeyringSlot {
    account: String,
}

impl KeyringSlot {
    /// The account name is the normalized backend URL so sessions for
    /// different servers never overwrite each other.
    pub fn for_backend(base_url: &str) -> Self {
        Self {
            account: crate::utils::url::normalize_base_url(base_url),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    fn entry(&self) -> Result<Entry, KeyringAccessError> {
        Entry::new(KEYRING_SERVICE, &self.account).map_err(KeyringAccessError::from)
    }
}

impl SessionSlot for KeyringSlot {
    fn read(&self) -> SlotResult<Option<String>> {
        match self.entry()?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(Box::new(KeyringAccessError::from(err))),
        }
    }

    fn write(&self, value: &str) -> SlotResult<()> {
        self.entry()?
            .set_password(value)
            .map_err(|err| Box::new(KeyringAccessError::from(err)) as _)
    }

    fn remove(&self) -> SlotResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(Box::new(KeyringAccessError::from(err))),
        }
    }
}
