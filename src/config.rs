//! # Configuration Management Module
//!
//! Persistent engine settings stored in platform-appropriate locations.
//! Handles loading, saving, and providing defaults for configuration options.
//!
//! ## Settings
//! - `mock_tick_interval_ms`: Period of the mock driver's fake samples
//! - `mock_heart_rate_min` / `mock_heart_rate_max`: Range mock heart rate is drawn from
//! - `mock_calories_per_tick` / `mock_distance_per_tick`: Mock increments per tick
//! - `collapse_paused_into_running`: Publish backend `Paused` as `Running`
//! - `default_activity` / `default_location`: Session the demo binary opens
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/live-workout/config.toml
//! - Linux: ~/.config/live-workout/config.toml
//! - Windows: %APPDATA%\live-workout\config.toml
//!
//! Session parameters themselves are never read from here; they are passed to
//! `start` as a `SessionConfiguration`.

use crate::configuration::{ActivityKind, LocationContext};
use crate::error::ConfigError;
use crate::state::PublicationPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mock_tick_interval_ms: u64,
    pub mock_heart_rate_min: f64,
    pub mock_heart_rate_max: f64,
    pub mock_calories_per_tick: f64,
    pub mock_distance_per_tick: f64,
    pub collapse_paused_into_running: bool,
    pub default_activity: ActivityKind,
    pub default_location: LocationContext,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mock_tick_interval_ms: 5_000,
            mock_heart_rate_min: 60.0,
            mock_heart_rate_max: 100.0,
            mock_calories_per_tick: 1.0,
            mock_distance_per_tick: 3.0,
            collapse_paused_into_running: false,
            default_activity: ActivityKind::Running,
            default_location: LocationContext::Outdoor,
        }
    }
}

impl EngineConfig {
    /// Get the path to the config file
    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("live-workout")
            .join("config.toml")
    }

    /// Load config from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path())
    }

    /// Load config from `path`, writing defaults there if the file is missing
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: Self = toml::from_str(&contents).map_err(ConfigError::ParseFailed)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, writing defaults", path.display());
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::config_path())
    }

    /// Save config to `path`
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string).map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mock_tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "mock_tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if !(self.mock_heart_rate_min.is_finite() && self.mock_heart_rate_max.is_finite())
            || self.mock_heart_rate_min > self.mock_heart_rate_max
        {
            return Err(ConfigError::Invalid(format!(
                "mock heart rate range {}..={} is empty",
                self.mock_heart_rate_min, self.mock_heart_rate_max
            )));
        }
        for (name, step) in [
            ("mock_calories_per_tick", self.mock_calories_per_tick),
            ("mock_distance_per_tick", self.mock_distance_per_tick),
        ] {
            if !step.is_finite() || step < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a non-negative number, got {}",
                    name, step
                )));
            }
        }
        Ok(())
    }

    pub fn mock_tick_interval(&self) -> Duration {
        Duration::from_millis(self.mock_tick_interval_ms)
    }

    pub fn publication_policy(&self) -> PublicationPolicy {
        PublicationPolicy {
            collapse_paused: self.collapse_paused_into_running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.mock_tick_interval(), Duration::from_secs(5));
        assert_eq!(config.mock_heart_rate_min, 60.0);
        assert_eq!(config.mock_heart_rate_max, 100.0);
        assert!(!config.collapse_paused_into_running);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = EngineConfig {
            collapse_paused_into_running: true,
            default_activity: ActivityKind::Swimming,
            ..EngineConfig::default()
        };

        let toml_str = toml::to_string(&config).expect("Failed to serialize");
        assert!(toml_str.contains("collapse_paused_into_running = true"));
        assert!(toml_str.contains("default_activity = \"swimming\""));
    }

    #[test]
    fn test_config_deserialization_fills_defaults() {
        let toml_str = r#"
            mock_tick_interval_ms = 250
            default_location = "indoor"
        "#;

        let config: EngineConfig = toml::from_str(toml_str).expect("Failed to deserialize");
        assert_eq!(config.mock_tick_interval_ms, 250);
        assert_eq!(config.default_location, LocationContext::Indoor);
        assert_eq!(config.mock_heart_rate_max, 100.0);
    }

    #[test]
    fn test_config_load_creates_default() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("config.toml");

        let config = EngineConfig::load_from(&path).expect("Failed to load config");
        assert_eq!(config, EngineConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_config_round_trip_through_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        let config = EngineConfig {
            mock_tick_interval_ms: 1_000,
            collapse_paused_into_running: true,
            ..EngineConfig::default()
        };

        config.save_to(&path).expect("Failed to save");
        let loaded = EngineConfig::load_from(&path).expect("Failed to load");
        assert_eq!(loaded, config);
        assert!(loaded.publication_policy().collapse_paused);
    }

    #[test]
    fn test_negative_or_non_finite_steps_rejected() {
        let negative = EngineConfig {
            mock_calories_per_tick: -1.0,
            ..EngineConfig::default()
        };
        assert!(matches!(negative.validate(), Err(ConfigError::Invalid(_))));

        let infinite = EngineConfig {
            mock_distance_per_tick: f64::INFINITY,
            ..EngineConfig::default()
        };
        assert!(matches!(infinite.validate(), Err(ConfigError::Invalid(_))));

        let nan = EngineConfig {
            mock_distance_per_tick: f64::NAN,
            ..EngineConfig::default()
        };
        assert!(nan.validate().is_err());

        let still = EngineConfig {
            mock_calories_per_tick: 0.0,
            ..EngineConfig::default()
        };
        assert!(still.validate().is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "mock_heart_rate_min = 120.0\nmock_heart_rate_max = 90.0\n")
            .expect("write config");

        assert!(matches!(
            EngineConfig::load_from(&path),
            Err(ConfigError::Invalid(_))
        ));
    }
}
