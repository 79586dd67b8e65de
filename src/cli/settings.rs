//! `chatwire config`: show or change persisted settings

use std::error::Error;

use clap::Subcommand;

use crate::core::config::data::path_display;
use crate::core::config::{Config, ConfigKey};

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigAction {
    /// Store a setting in config.toml
    Set {
        /// base-url, token-storage, default-model, default-agent or page-size
        key: String,
        value: String,
    },
    /// Remove a setting so its default applies again
    Unset { key: String },
}

pub fn run(action: Option<ConfigAction>, effective: &Config) -> Result<(), Box<dyn Error>> {
    let Some(action) = action else {
        effective.print_all();
        return Ok(());
    };

    let (path, key, saved) = match action {
        ConfigAction::Set { key, value } => {
            let key: ConfigKey = key.parse()?;
            let (path, saved) = Config::update(|config| config.set(key, &value))?;
            (path, key, saved)
        }
        ConfigAction::Unset { key } => {
            let key: ConfigKey = key.parse()?;
            let (path, saved) = Config::update(|config| {
                config.unset(key);
                Ok(())
            })?;
            (path, key, saved)
        }
    };
    println!(
        "✅ {} = {} (saved to {})",
        key.as_str(),
        saved.display_value(key),
        path_display(path)
    );
    Ok(())
}
