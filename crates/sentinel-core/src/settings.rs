//! Persistent user settings for Sentinel
//!
//! Settings are stored in a TOML configuration file at:
//! - Linux: `~/.config/sentinel/sentinel_config.toml`
//! - macOS: `~/Library/Application Support/sentinel/sentinel_config.toml`
//! - Windows: `%APPDATA%\sentinel\sentinel_config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! [check]
//! size_fraction = 0.05
//! chunk_size = "1M"
//! verify_passes = 1
//!
//! [sweep]
//! interval_days = 14
//! chunk_size = "4M"
//! verify_passes = 1
//!
//! [behavior]
//! quiet = false
//! ```

use crate::config::{
    ProbeConfig, ScanConfig, DEFAULT_SIZE_FRACTION, DEFAULT_SWEEP_INTERVAL_DAYS,
};
use crate::units::parse_size;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration file name
const CONFIG_FILE_NAME: &str = "sentinel_config.toml";

/// Application name for config directory
const APP_NAME: &str = "sentinel";

/// User settings loaded from configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Quick check settings
    pub check: CheckSettings,

    /// Full sweep settings
    pub sweep: SweepSettings,

    /// Behavior settings
    pub behavior: BehaviorSettings,
}

/// Settings for quick checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckSettings {
    /// Share of free space to test, in (0, 1]
    pub size_fraction: f64,

    /// Chunk size (e.g., "1M", "512K")
    pub chunk_size: String,

    /// Read-back passes
    pub verify_passes: u32,
}

/// Settings for full sweeps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweepSettings {
    /// Days between sweeps when the drive has no recommendation yet
    pub interval_days: u32,

    /// Chunk size for the free-space probe (e.g., "4M")
    pub chunk_size: String,

    /// Read-back passes
    pub verify_passes: u32,
}

/// General behavior settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BehaviorSettings {
    /// Whether to suppress non-error output
    pub quiet: bool,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            size_fraction: DEFAULT_SIZE_FRACTION,
            chunk_size: "1M".to_string(),
            verify_passes: 1,
        }
    }
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            interval_days: DEFAULT_SWEEP_INTERVAL_DAYS,
            chunk_size: "4M".to_string(),
            verify_passes: 1,
        }
    }
}

impl Settings {
    /// Load settings from the configuration file
    ///
    /// Returns default settings if the file doesn't exist or can't be parsed
    pub fn load() -> Self {
        Self::load_from_path(Self::config_path())
    }

    /// Load settings from a specific path
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            tracing::debug!("No config path available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(settings) => {
                    tracing::debug!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Parse settings from TOML text
    pub fn parse(contents: &str) -> Result<Self, SettingsError> {
        toml::from_str(contents).map_err(SettingsError::Deserialize)
    }

    /// Save settings to the configuration file
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        self.save_to_path(Self::config_path())
    }

    /// Save settings to a specific path
    pub fn save_to_path(&self, path: Option<PathBuf>) -> Result<PathBuf, SettingsError> {
        let path = path.ok_or(SettingsError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let contents = toml::to_string_pretty(self).map_err(SettingsError::Serialize)?;

        std::fs::write(&path, contents).map_err(|e| SettingsError::Io {
            path: path.clone(),
            source: e,
        })?;

        tracing::info!("Saved settings to {:?}", path);
        Ok(path)
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join(CONFIG_FILE_NAME))
    }

    /// Get the path to the configuration directory
    pub fn config_dir() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join(APP_NAME))
    }

    /// Check if a configuration file exists
    pub fn config_exists() -> bool {
        Self::config_path().is_some_and(|p| p.exists())
    }

    /// Generate a default configuration file content as a string
    pub fn default_config_string() -> String {
        let default = Self::default();
        toml::to_string_pretty(&default)
            .unwrap_or_else(|_| String::from("# Failed to generate default config"))
    }

    /// Build the runtime scan configuration from these settings
    pub fn scan_config(&self) -> Result<ScanConfig, SettingsError> {
        let fraction = self.check.size_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(SettingsError::InvalidValue {
                key: "check.size_fraction".to_string(),
                message: format!("{} is not in (0, 1]", fraction),
            });
        }

        let quick = ProbeConfig::quick_check()
            .coverage(fraction)
            .chunk_size(parse_chunk("check.chunk_size", &self.check.chunk_size)?)
            .verify_passes(self.check.verify_passes);
        let sweep = ProbeConfig::free_space_sweep()
            .chunk_size(parse_chunk("sweep.chunk_size", &self.sweep.chunk_size)?)
            .verify_passes(self.sweep.verify_passes);

        Ok(ScanConfig::new()
            .quick(quick)
            .sweep(sweep)
            .default_interval_days(self.sweep.interval_days))
    }
}

fn parse_chunk(key: &str, value: &str) -> Result<usize, SettingsError> {
    parse_size(value)
        .ok()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| SettingsError::InvalidValue {
            key: key.to_string(),
            message: format!("invalid size {:?}", value),
        })
}

/// Errors that can occur when working with settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// No configuration directory available
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    /// Failed to read or write config file
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path that caused the error
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Failed to serialize settings
    #[error("Failed to serialize settings: {0}")]
    Serialize(toml::ser::Error),

    /// Failed to deserialize settings
    #[error("Failed to parse settings: {0}")]
    Deserialize(toml::de::Error),

    /// A setting has an unusable value
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// Dotted setting name
        key: String,
        /// What is wrong with it
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MIN_CHUNK_SIZE, QUICK_CHUNK_SIZE, SWEEP_CHUNK_SIZE};
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!((settings.check.size_fraction - 0.05).abs() < f64::EPSILON);
        assert_eq!(settings.check.chunk_size, "1M");
        assert_eq!(settings.check.verify_passes, 1);
        assert_eq!(settings.sweep.interval_days, 14);
        assert_eq!(settings.sweep.chunk_size, "4M");
        assert!(!settings.behavior.quiet);
    }

    #[test]
    fn test_settings_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("sentinel_config.toml");

        let settings = Settings {
            check: CheckSettings {
                size_fraction: 0.1,
                chunk_size: "512K".to_string(),
                verify_passes: 2,
            },
            sweep: SweepSettings {
                interval_days: 7,
                chunk_size: "8M".to_string(),
                verify_passes: 1,
            },
            behavior: BehaviorSettings { quiet: true },
        };

        settings.save_to_path(Some(config_path.clone())).unwrap();
        assert!(config_path.exists());

        let loaded = Settings::load_from_path(Some(config_path));
        assert_eq!(settings, loaded);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let settings =
            Settings::load_from_path(Some(PathBuf::from("/nonexistent/sentinel_config.toml")));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_no_path() {
        assert_eq!(Settings::load_from_path(None), Settings::default());
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("sentinel_config.toml");

        std::fs::write(&config_path, "[sweep]\ninterval_days = 30\n").unwrap();
        let settings = Settings::load_from_path(Some(config_path));

        assert_eq!(settings.sweep.interval_days, 30);
        assert_eq!(settings.sweep.chunk_size, "4M");
        assert_eq!(settings.check, CheckSettings::default());
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("sentinel_config.toml");
        std::fs::write(&config_path, "this is not valid toml {{{{").unwrap();

        assert_eq!(Settings::load_from_path(Some(config_path)), Settings::default());
        assert!(matches!(
            Settings::parse("[check]\nsize_fraction = \"lots\""),
            Err(SettingsError::Deserialize(_))
        ));
    }

    #[test]
    fn test_default_config_string() {
        let config_str = Settings::default_config_string();
        assert!(config_str.contains("[check]"));
        assert!(config_str.contains("[sweep]"));
        assert!(config_str.contains("[behavior]"));
        assert!(config_str.contains("size_fraction"));
        assert!(config_str.contains("interval_days"));
    }

    #[test]
    fn test_config_path() {
        if let Some(p) = Settings::config_path() {
            assert!(p.to_string_lossy().contains("sentinel"));
            assert!(p.to_string_lossy().ends_with("sentinel_config.toml"));
        }
        if let Some(d) = Settings::config_dir() {
            assert!(!d.to_string_lossy().contains("sentinel_config.toml"));
        }
    }

    #[test]
    fn test_save_to_none_path() {
        let result = Settings::default().save_to_path(None);
        assert!(matches!(result, Err(SettingsError::NoConfigDir)));
    }

    #[test]
    fn test_scan_config_defaults() {
        let config = Settings::default().scan_config().unwrap();
        assert_eq!(config.quick.chunk_size, QUICK_CHUNK_SIZE);
        assert_eq!(config.sweep.chunk_size, SWEEP_CHUNK_SIZE);
        assert!((config.quick.coverage - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.default_interval_days, 14);
    }

    #[test]
    fn test_scan_config_custom() {
        let mut settings = Settings::default();
        settings.check.chunk_size = "1K".to_string();
        settings.check.verify_passes = 3;
        settings.sweep.interval_days = 0;

        let config = settings.scan_config().unwrap();
        assert_eq!(config.quick.chunk_size, MIN_CHUNK_SIZE);
        assert_eq!(config.quick.verify_passes, 3);
        assert_eq!(config.default_interval_days, 1);
    }

    #[test]
    fn test_scan_config_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.check.size_fraction = 0.0;
        assert!(matches!(
            settings.scan_config(),
            Err(SettingsError::InvalidValue { .. })
        ));

        let mut settings = Settings::default();
        settings.sweep.chunk_size = "huge".to_string();
        let err = settings.scan_config().unwrap_err();
        assert!(err.to_string().contains("sweep.chunk_size"));
    }

    #[test]
    fn test_settings_error_display() {
        let err = SettingsError::NoConfigDir;
        assert!(err.to_string().contains("configuration directory"));

        let io_err = SettingsError::Io {
            path: PathBuf::from("/test/path"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(io_err.to_string().contains("/test/path"));
    }
}
