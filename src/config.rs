use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const CONFIG_FILE: &str = ".config/dfu-harness/config.yaml";

fn default_baud_rate() -> u32 {
    115_200
}

fn default_read_timeout_secs() -> u64 {
    10
}

fn default_build_timeout_secs() -> u64 {
    120
}

/// Harness configuration for one device under test
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Serial number of the device under test
    pub serial_number: String,
    /// Board name passed to the build wrapper
    #[serde(default)]
    pub board: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,
}

impl Config {
    pub fn load(config_file: &Option<String>) -> Result<Self> {
        let config_path = match config_file {
            Some(file) => PathBuf::from(file),
            None => Self::get_config_path()?,
        };

        // Try to load from config file first
        if config_path.exists() {
            let config_content = std::fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            let config: Config = serde_yaml::from_str(&config_content)
                .context("Failed to parse config file as YAML")?;

            Ok(config)
        } else {
            // Fallback to environment variables
            let serial_number = std::env::var("DFU_SERIAL_NUMBER").with_context(|| {
                format!(
                    "Config file not found at {} and DFU_SERIAL_NUMBER environment variable is not set",
                    config_path.display()
                )
            })?;

            let board = std::env::var("DFU_BOARD").ok();

            let baud_rate = match std::env::var("DFU_BAUD_RATE") {
                Ok(value) => value
                    .trim()
                    .parse()
                    .context("DFU_BAUD_RATE is not a valid baud rate")?,
                Err(_) => default_baud_rate(),
            };

            Ok(Config {
                serial_number,
                board,
                baud_rate,
                read_timeout_secs: default_read_timeout_secs(),
                build_timeout_secs: default_build_timeout_secs(),
            })
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    fn get_config_path() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Unable to determine home directory")?;
        Ok(home_dir.join(CONFIG_FILE))
    }
}
