use crate::core::config::data::{path_display, Config, ConfigKey};

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        match Self::config_path() {
            Some(path) => println!("  file: {}", path_display(path)),
            None => println!("  file: (no config directory)"),
        }
        for key in ConfigKey::ALL {
            println!("  {}: {}", key.as_str(), self.display_value(key));
        }
    }
}
