use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Refresh intervals (minutes) offered by the settings panel. `0` turns auto-refresh off.
pub const SUPPORTED_REFRESH_MINUTES: [u32; 6] = [0, 1, 5, 10, 30, 60];

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Weather settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// UI preferences
    #[serde(default)]
    pub ui: UiConfig,
}

/// Temperature unit preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Metric,
    Imperial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// City selected when the dashboard opens (empty = none)
    #[serde(default = "default_location")]
    pub default_location: String,

    /// Temperature unit preference
    #[serde(default)]
    pub temperature_unit: TemperatureUnit,

    /// Auto-refresh interval in minutes (0 disables auto-refresh)
    #[serde(default = "default_refresh_minutes")]
    pub refresh_minutes: u32,

    /// Minimum spacing between two data-source fetches
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Quiet period before typed city input is applied
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Give up on a data-source call after this many seconds (0 waits forever)
    #[serde(default)]
    pub fetch_timeout_secs: u64,
}

fn default_location() -> String {
    "London".to_string()
}

fn default_refresh_minutes() -> u32 {
    5
}

fn default_throttle_ms() -> u64 {
    5000
}

fn default_debounce_ms() -> u64 {
    300
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            default_location: default_location(),
            temperature_unit: TemperatureUnit::default(),
            refresh_minutes: default_refresh_minutes(),
            throttle_ms: default_throttle_ms(),
            debounce_ms: default_debounce_ms(),
            fetch_timeout_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiConfig {
    /// Dark mode enabled
    #[serde(default)]
    pub dark_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nimbus");

        Self {
            config_dir,
            weather: WeatherConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, writing defaults there if it is missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", config_path.display(), e)))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        Self::load_validated_from(&Self::config_path()?)
    }

    /// [`load_validated`](Self::load_validated) for an explicit path.
    /// Parse and validation failures carry a [`ConfigError`].
    pub fn load_validated_from(config_path: &Path) -> Result<(Self, ValidationResult)> {
        let config = Self::load_from(config_path)?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        let weather = &self.weather;

        if weather.default_location.trim().is_empty() && !weather.default_location.is_empty() {
            result.add_error(
                "weather.default_location",
                "Location must not be blank",
            );
        }

        if weather.refresh_minutes == 0 {
            result.add_warning(
                "weather.refresh_minutes",
                "Weather auto-refresh disabled (0 minutes)",
            );
        } else if !SUPPORTED_REFRESH_MINUTES.contains(&weather.refresh_minutes) {
            result.add_warning(
                "weather.refresh_minutes",
                format!(
                    "{} minutes is not one of the offered intervals {:?}",
                    weather.refresh_minutes, SUPPORTED_REFRESH_MINUTES
                ),
            );
        }

        if weather.throttle_ms == 0 {
            result.add_error(
                "weather.throttle_ms",
                "Throttle delay must be greater than 0",
            );
        }

        if weather.debounce_ms == 0 {
            result.add_error(
                "weather.debounce_ms",
                "Debounce delay must be greater than 0",
            );
        } else if weather.debounce_ms > 10_000 {
            result.add_warning(
                "weather.debounce_ms",
                "Debounce delay is unusually large (>10s)",
            );
        }

        if weather.fetch_timeout_secs > 0
            && weather.fetch_timeout_secs.saturating_mul(1000) <= weather.throttle_ms
        {
            result.add_warning(
                "weather.fetch_timeout_secs",
                "Fetch timeout is shorter than the throttle window",
            );
        }

        result
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("nimbus");

        Ok(config_dir.join("config.toml"))
    }
}
