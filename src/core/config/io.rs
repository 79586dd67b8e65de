//! Reading and writing `config.toml`.
//!
//! The file lives in the platform config directory. A missing file reads as
//! the default configuration; writes stage the new contents in a temporary
//! file next to the target and rename it into place.

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::core::config::data::{path_display, Config, ConfigKey};

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    Write { path: PathBuf, source: io::Error },
    Encode(toml::ser::Error),
    /// `config set` named a key that does not exist.
    UnknownKey(String),
    InvalidValue { key: ConfigKey, message: String },
    /// The platform offers no per-user config directory.
    NoConfigDir,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Cannot read {}: {source}", path_display(path))
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Invalid settings in {}: {source}", path_display(path))
            }
            ConfigError::Write { path, source } => {
                write!(f, "Cannot write {}: {source}", path_display(path))
            }
            ConfigError::Encode(source) => write!(f, "Cannot encode settings: {source}"),
            ConfigError::UnknownKey(key) => {
                let known = ConfigKey::ALL.map(ConfigKey::as_str).join(", ");
                write!(f, "Unknown setting '{key}' (known settings: {known})")
            }
            ConfigError::InvalidValue { key, message } => {
                write!(f, "Invalid value for {}: {message}", key.as_str())
            }
            ConfigError::NoConfigDir => {
                write!(f, "No per-user config directory is available on this system")
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } | ConfigError::Write { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Encode(source) => Some(source),
            _ => None,
        }
    }
}

impl Config {
    /// `config.toml` in the per-user config directory.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "chatwire", "chatwire")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The user's settings with environment overrides applied.
    pub fn load() -> Result<Config, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) => Self::load_from_path(&path)?,
            None => Config::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |source: io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Encode)?;
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        fs::create_dir_all(dir).map_err(write_error)?;
        let mut staged = NamedTempFile::new_in(dir).map_err(write_error)?;
        staged
            .write_all(contents.as_bytes())
            .and_then(|()| staged.as_file().sync_all())
            .map_err(write_error)?;
        staged
            .persist(path)
            .map_err(|err| write_error(err.error))?;
        debug!(path = %path_display(path), "Saved settings");
        Ok(())
    }

    /// Read the file at `path`, apply `edit` and write the result back.
    ///
    /// Environment overrides are not applied, so they never end up on disk.
    pub fn update_at<F>(path: &Path, edit: F) -> Result<Config, ConfigError>
    where
        F: FnOnce(&mut Config) -> Result<(), ConfigError>,
    {
        let mut config = Self::load_from_path(path)?;
        edit(&mut config)?;
        config.save_to_path(path)?;
        Ok(config)
    }

    /// [`Config::update_at`] on the user's config file.
    pub fn update<F>(edit: F) -> Result<(PathBuf, Config), ConfigError>
    where
        F: FnOnce(&mut Config) -> Result<(), ConfigError>,
    {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        let config = Self::update_at(&path, edit)?;
        Ok((path, config))
    }
}
