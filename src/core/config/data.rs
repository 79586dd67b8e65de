use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use crate::core::config::io::ConfigError;
use crate::core::conversations::DEFAULT_PAGE_SIZE;
use crate::core::keyring::KeyringSlot;
use crate::core::token_store::{FileSlot, TokenStore};
use crate::utils::url::normalize_base_url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Where the session blob is persisted between runs.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    #[default]
    Keyring,
    File,
}

impl TokenStorage {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenStorage::Keyring => "keyring",
            TokenStorage::File => "file",
        }
    }
}

impl fmt::Display for TokenStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenStorage {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyring" => Ok(TokenStorage::Keyring),
            "file" => Ok(TokenStorage::File),
            other => Err(format!(
                "Unknown token storage '{other}' (expected 'keyring' or 'file')"
            )),
        }
    }
}

/// A setting that `chatwire config set` can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    BaseUrl,
    TokenStorage,
    DefaultModel,
    DefaultAgent,
    PageSize,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 5] = [
        ConfigKey::BaseUrl,
        ConfigKey::TokenStorage,
        ConfigKey::DefaultModel,
        ConfigKey::DefaultAgent,
        ConfigKey::PageSize,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::BaseUrl => "base-url",
            ConfigKey::TokenStorage => "token-storage",
            ConfigKey::DefaultModel => "default-model",
            ConfigKey::DefaultAgent => "default-agent",
            ConfigKey::PageSize => "page-size",
        }
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    /// Accepts the kebab-case CLI spelling or the snake_case file spelling.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(value.trim().to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Backend root, e.g. "https://chat.example.com"
    pub base_url: Option<String>,
    pub token_storage: Option<TokenStorage>,
    /// Model id to request when none is given on the command line
    pub default_model: Option<String>,
    pub default_agent: Option<String>,
    /// Conversations fetched per page
    pub page_size: Option<usize>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    pub fn base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(normalize_base_url)
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn token_storage(&self) -> TokenStorage {
        self.token_storage.unwrap_or_default()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Open the configured session storage for the configured backend.
    pub fn token_store(&self) -> Arc<TokenStore> {
        let store = match self.token_storage() {
            TokenStorage::Keyring => TokenStore::new(KeyringSlot::for_backend(&self.base_url())),
            TokenStorage::File => match FileSlot::default_location() {
                Some(slot) => TokenStore::new(slot),
                None => {
                    warn!("No data directory available; session will not persist");
                    TokenStore::in_memory()
                }
            },
        };
        Arc::new(store)
    }

    /// Validate `value` and store it under `key`.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidValue {
            key,
            message: message.to_string(),
        };
        let value = value.trim();
        match key {
            ConfigKey::BaseUrl => {
                let url = normalize_base_url(value);
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(invalid("expected an http:// or https:// URL"));
                }
                self.base_url = Some(url);
            }
            ConfigKey::TokenStorage => {
                self.token_storage = Some(value.parse().map_err(|message: String| invalid(&message))?);
            }
            ConfigKey::DefaultModel | ConfigKey::DefaultAgent if value.is_empty() => {
                return Err(invalid("must not be empty"));
            }
            ConfigKey::DefaultModel => self.default_model = Some(value.to_string()),
            ConfigKey::DefaultAgent => self.default_agent = Some(value.to_string()),
            ConfigKey::PageSize => match value.parse::<usize>() {
                Ok(size) if size > 0 => self.page_size = Some(size),
                _ => return Err(invalid("expected a whole number greater than zero")),
            },
        }
        Ok(())
    }

    /// Forget the stored value so the default applies again.
    pub fn unset(&mut self, key: ConfigKey) {
        match key {
            ConfigKey::BaseUrl => self.base_url = None,
            ConfigKey::TokenStorage => self.token_storage = None,
            ConfigKey::DefaultModel => self.default_model = None,
            ConfigKey::DefaultAgent => self.default_agent = None,
            ConfigKey::PageSize => self.page_size = None,
        }
    }

    /// The effective value of `key` as shown to the user.
    pub fn display_value(&self, key: ConfigKey) -> String {
        match key {
            ConfigKey::BaseUrl => self.base_url(),
            ConfigKey::TokenStorage => self.token_storage().to_string(),
            ConfigKey::DefaultModel => self.default_model.clone().unwrap_or_else(|| "(unset)".into()),
            ConfigKey::DefaultAgent => self.default_agent.clone().unwrap_or_else(|| "(unset)".into()),
            ConfigKey::PageSize => self.page_size().to_string(),
        }
    }

    /// Apply environment overrides, looked up through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup("CHATWIRE_BASE_URL").filter(|url| !url.trim().is_empty()) {
            self.base_url = Some(base_url);
        }
    }
}
