//! CLI configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub listen: ListenSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    pub log_level: String,
    /// Prefer the device with this serial number when no device argument
    /// is given and several are attached
    #[serde(default)]
    pub serial_filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenSettings {
    /// Delay between poll reads in the listen loop
    #[serde(default = "ListenSettings::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ListenSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: Self::default_poll_interval_ms(),
        }
    }
}

impl ListenSettings {
    fn default_poll_interval_ms() -> u64 {
        250
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeSettings {
                log_level: "info".to_string(),
                serial_filter: None,
            },
            listen: ListenSettings::default(),
        }
    }
}

impl CliConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/bitbox-usb/cli.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: CliConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Falling back to default config: {}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
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

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("bitbox-usb").join("cli.toml")
        } else {
            PathBuf::from(".config/bitbox-usb/cli.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.bridge.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.bridge.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.listen.poll_interval_ms == 0 {
            return Err(anyhow!("listen.poll_interval_ms must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert_eq!(config.bridge.log_level, "info");
        assert!(config.bridge.serial_filter.is_none());
        assert_eq!(config.listen.poll_interval_ms, 250);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = CliConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: CliConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.bridge.log_level, parsed.bridge.log_level);
        assert_eq!(
            config.listen.poll_interval_ms,
            parsed.listen.poll_interval_ms
        );
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = CliConfig::default();
        config.bridge.log_level = "verbose".to_string();
        assert!(config.validate().is_err());

        config.bridge.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_poll_interval() {
        let mut config = CliConfig::default();
        config.listen.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cli.toml");

        let mut config = CliConfig::default();
        config.bridge.serial_filter = Some("v9.21.0-abcdef".to_string());
        config.save(&path).unwrap();

        let loaded = CliConfig::load(Some(path)).unwrap();
        assert_eq!(
            loaded.bridge.serial_filter.as_deref(),
            Some("v9.21.0-abcdef")
        );
    }

    #[test]
    fn test_listen_section_is_optional() {
        let parsed: CliConfig = toml::from_str("[bridge]\nlog_level = \"warn\"\n").unwrap();
        assert_eq!(parsed.bridge.log_level, "warn");
        assert_eq!(parsed.listen.poll_interval_ms, 250);
    }
}
