//! CLI configuration management

use anyhow::{Context, Result, anyhow};
use common::logging;
use rawusb::DeviceFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Default vendor/product filter for `list`
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "LoggingSettings::default_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

impl LoggingSettings {
    fn default_level() -> String {
        "info".to_string()
    }
}

/// Hex ids such as `"0x1209"`; unset matches any device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

/// Transfer timeouts in milliseconds, 0 blocks indefinitely
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default)]
    pub read_ms: u64,
    #[serde(default)]
    pub write_ms: u64,
}

impl TimeoutSettings {
    pub fn read(&self) -> Option<Duration> {
        Self::millis(self.read_ms)
    }

    pub fn write(&self) -> Option<Duration> {
        Self::millis(self.write_ms)
    }

    fn millis(ms: u64) -> Option<Duration> {
        (ms > 0).then(|| Duration::from_millis(ms))
    }
}

impl CliConfig {
    /// Load configuration from `path`, or the first standard location that exists
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => expand(&p),
            None => Self::candidates()
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?,
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: CliConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::debug!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if none is found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("rawusb").join("rawusb.toml")
        } else {
            PathBuf::from(".config/rawusb/rawusb.toml")
        }
    }

    /// Standard locations, searched in order
    pub fn candidates() -> Vec<PathBuf> {
        vec![
            Self::default_path(),
            PathBuf::from("/etc/rawusb/rawusb.toml"),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if !logging::is_valid_level(&self.logging.level) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.logging.level,
                logging::LOG_LEVELS.join(", ")
            ));
        }

        self.filter()?;
        Ok(())
    }

    /// Vendor/product filter from the `[device]` section
    pub fn filter(&self) -> Result<DeviceFilter> {
        let vendor_id = parse_id(self.device.vendor_id.as_deref(), "vendor_id")?;
        let product_id = parse_id(self.device.product_id.as_deref(), "product_id")?;
        Ok(DeviceFilter::new(vendor_id, product_id))
    }
}

fn parse_id(id: Option<&str>, name: &str) -> Result<Option<u16>> {
    id.map(|id| common::parse_hex_id(id).with_context(|| format!("Invalid {}", name)))
        .transpose()
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}
