//! Configuration management for powder
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::PowderError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure for powder
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PowderConfig {
    /// Language model configuration
    pub llm: LlmConfig,
    /// Weather API configuration
    pub weather: WeatherConfig,
    /// Routing API configuration
    pub routing: RoutingConfig,
    /// Cache configuration
    pub cache: CacheConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Default application settings
    pub defaults: DefaultsConfig,
}

/// Language model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Anthropic API key; falls back to `ANTHROPIC_API_KEY`
    pub api_key: Option<String>,
    /// Model identifier in `provider/model` form
    pub model: String,
    /// Base URL of the Messages API
    pub base_url: String,
    /// Maximum tokens per completion
    pub max_tokens: u32,
    /// Request timeout in seconds
    pub timeout_seconds: u32,
    /// Retries on rate limiting and server errors
    pub max_retries: u32,
}

/// Weather API configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Base URL for the forecast API
    pub base_url: String,
    /// Base URL for the historic archive API
    pub archive_url: String,
    /// Base URL for the geocoding API
    pub geocoding_url: String,
    /// Timezone used for hourly data
    pub timezone: String,
    /// Number of forecast days to request
    pub forecast_days: u32,
    /// Request timeout in seconds
    pub timeout_seconds: u32,
}

/// Routing API configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// OpenRouteService key; falls back to `OPEN_ROUTE_SERVICE_API_KEY`
    pub api_key: Option<String>,
    /// Base URL for OpenRouteService
    pub base_url: String,
    /// Routing profile
    pub profile: String,
}

/// Cache configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether the persistent cache is used at all
    pub enabled: bool,
    /// Forecast cache TTL in hours
    pub ttl_hours: u32,
    /// Cache directory location
    pub location: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (pretty or json)
    pub format: String,
}

/// Default application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Location key or name used when `--location` is absent
    pub location: String,
    /// Drive budget used when the query names none
    pub max_drive_hours: f64,
    /// SQLite database with the mountain table
    pub database_path: String,
    /// JSONL seed for the mountain table
    pub seed_path: String,
    /// Directory holding historic weather fixtures
    pub fixtures_dir: String,
    /// Directory for saved traces
    pub traces_dir: String,
}

// Default value functions
fn default_model() -> String {
    "anthropic/claude-haiku-4-5-20251001".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_llm_timeout() -> u32 {
    120
}

fn default_llm_max_retries() -> u32 {
    3
}

fn default_weather_base_url() -> String {
    "https://api.open-meteo.com/v1".to_string()
}

fn default_archive_url() -> String {
    "https://archive-api.open-meteo.com/v1".to_string()
}

fn default_geocoding_url() -> String {
    "https://geocoding-api.open-meteo.com/v1".to_string()
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_forecast_days() -> u32 {
    7
}

fn default_weather_timeout() -> u32 {
    10
}

fn default_routing_base_url() -> String {
    "https://api.openrouteservice.org/v2".to_string()
}

fn default_routing_profile() -> String {
    "driving-car".to_string()
}

fn default_cache_ttl() -> u32 {
    6
}

fn default_cache_location() -> String {
    "~/.cache/powder".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_location() -> String {
    "boston".to_string()
}

fn default_max_drive_hours() -> f64 {
    3.0
}

fn default_database_path() -> String {
    "data/mountains.db".to_string()
}

fn default_seed_path() -> String {
    "data/mountains.jsonl".to_string()
}

fn default_fixtures_dir() -> String {
    "fixtures".to_string()
}

fn default_traces_dir() -> String {
    "traces".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_llm_base_url(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_llm_timeout(),
            max_retries: default_llm_max_retries(),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_base_url(),
            archive_url: default_archive_url(),
            geocoding_url: default_geocoding_url(),
            timezone: default_timezone(),
            forecast_days: default_forecast_days(),
            timeout_seconds: default_weather_timeout(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_routing_base_url(),
            profile: default_routing_profile(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_hours: default_cache_ttl(),
            location: default_cache_location(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            location: default_location(),
            max_drive_hours: default_max_drive_hours(),
            database_path: default_database_path(),
            seed_path: default_seed_path(),
            fixtures_dir: default_fixtures_dir(),
            traces_dir: default_traces_dir(),
        }
    }
}

impl CacheConfig {
    /// Cache directory with a leading `~` expanded to the home directory
    #[must_use]
    pub fn resolved_location(&self) -> PathBuf {
        match self.location.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(rest)),
            None => PathBuf::from(&self.location),
        }
    }
}

impl PowderConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        // Load from file if path is provided or use default location
        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // POWDER_LLM__MODEL, POWDER_DEFAULTS__MAX_DRIVE_HOURS, ...
        builder = builder.add_source(
            Environment::with_prefix("POWDER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: PowderConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("powder").join("config.toml"))
    }

    /// Anthropic key from config, else from the environment
    #[must_use]
    pub fn anthropic_api_key(&self) -> Option<String> {
        non_empty(self.llm.api_key.clone())
            .or_else(|| non_empty(std::env::var("ANTHROPIC_API_KEY").ok()))
    }

    /// OpenRouteService key from config, else from the environment
    #[must_use]
    pub fn routing_api_key(&self) -> Option<String> {
        non_empty(self.routing.api_key.clone())
            .or_else(|| non_empty(std::env::var("OPEN_ROUTE_SERVICE_API_KEY").ok()))
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.llm.model.is_empty() {
            self.llm.model = default_model();
        }
        if self.llm.base_url.is_empty() {
            self.llm.base_url = default_llm_base_url();
        }
        if self.llm.max_tokens == 0 {
            self.llm.max_tokens = default_max_tokens();
        }
        if self.llm.timeout_seconds == 0 {
            self.llm.timeout_seconds = default_llm_timeout();
        }
        if self.weather.base_url.is_empty() {
            self.weather.base_url = default_weather_base_url();
        }
        if self.weather.archive_url.is_empty() {
            self.weather.archive_url = default_archive_url();
        }
        if self.weather.geocoding_url.is_empty() {
            self.weather.geocoding_url = default_geocoding_url();
        }
        if self.weather.timezone.is_empty() {
            self.weather.timezone = default_timezone();
        }
        if self.weather.forecast_days == 0 {
            self.weather.forecast_days = default_forecast_days();
        }
        if self.weather.timeout_seconds == 0 {
            self.weather.timeout_seconds = default_weather_timeout();
        }
        if self.routing.base_url.is_empty() {
            self.routing.base_url = default_routing_base_url();
        }
        if self.routing.profile.is_empty() {
            self.routing.profile = default_routing_profile();
        }
        if self.cache.ttl_hours == 0 {
            self.cache.ttl_hours = default_cache_ttl();
        }
        if self.cache.location.is_empty() {
            self.cache.location = default_cache_location();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
        if self.defaults.location.is_empty() {
            self.defaults.location = default_location();
        }
        if self.defaults.max_drive_hours == 0.0 {
            self.defaults.max_drive_hours = default_max_drive_hours();
        }
        if self.defaults.database_path.is_empty() {
            self.defaults.database_path = default_database_path();
        }
        if self.defaults.seed_path.is_empty() {
            self.defaults.seed_path = default_seed_path();
        }
        if self.defaults.fixtures_dir.is_empty() {
            self.defaults.fixtures_dir = default_fixtures_dir();
        }
        if self.defaults.traces_dir.is_empty() {
            self.defaults.traces_dir = default_traces_dir();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_api_keys()?;
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    /// Validate API keys and credentials
    pub fn validate_api_keys(&self) -> Result<()> {
        for (label, key) in [
            ("Anthropic", &self.llm.api_key),
            ("OpenRouteService", &self.routing.api_key),
        ] {
            if let Some(api_key) = key {
                if api_key.is_empty() {
                    return Err(PowderError::config(format!(
                        "{label} API key cannot be empty if provided. Either remove it or provide a valid key."
                    ))
                    .into());
                }

                if api_key.len() < 8 {
                    return Err(PowderError::config(format!(
                        "{label} API key appears to be invalid (too short). Please check your API key."
                    ))
                    .into());
                }

                if api_key.len() > 200 {
                    return Err(PowderError::config(format!(
                        "{label} API key appears to be invalid (too long). Please check your API key."
                    ))
                    .into());
                }
            }
        }

        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.llm.timeout_seconds > 300 || self.weather.timeout_seconds > 300 {
            return Err(PowderError::config("API timeout cannot exceed 300 seconds").into());
        }

        if self.llm.max_retries > 10 {
            return Err(PowderError::config("LLM max retries cannot exceed 10").into());
        }

        if self.llm.max_tokens > 64_000 {
            return Err(PowderError::config("LLM max tokens cannot exceed 64000").into());
        }

        if self.weather.forecast_days > 16 {
            return Err(PowderError::config("Forecast days cannot exceed 16").into());
        }

        if self.cache.ttl_hours > 168 {
            return Err(
                PowderError::config("Cache TTL cannot exceed 168 hours (1 week)").into(),
            );
        }

        if !(self.defaults.max_drive_hours > 0.0 && self.defaults.max_drive_hours <= 12.0) {
            return Err(PowderError::config(
                "Default max drive hours must be greater than 0 and at most 12",
            )
            .into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(PowderError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(PowderError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for (label, url) in [
            ("LLM", &self.llm.base_url),
            ("Weather", &self.weather.base_url),
            ("Weather archive", &self.weather.archive_url),
            ("Geocoding", &self.weather.geocoding_url),
            ("Routing", &self.routing.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(PowderError::config(format!(
                    "{label} API base URL must be a valid HTTP or HTTPS URL"
                ))
                .into());
            }
        }

        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PowderConfig::default();
        assert_eq!(config.llm.model, "anthropic/claude-haiku-4-5-20251001");
        assert_eq!(config.weather.base_url, "https://api.open-meteo.com/v1");
        assert_eq!(config.weather.timezone, "America/New_York");
        assert_eq!(config.weather.forecast_days, 7);
        assert_eq!(config.cache.ttl_hours, 6);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.defaults.location, "boston");
        assert_eq!(config.defaults.max_drive_hours, 3.0);
        assert!(config.llm.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_short_api_key() {
        let mut config = PowderConfig::default();
        config.routing.api_key = Some("abc".to_string());
        let result = config.validate_api_keys();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("too short"));
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = PowderConfig::default();
        config.logging.level = "invalid".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_config_validation_numeric_ranges() {
        let mut config = PowderConfig::default();
        config.llm.timeout_seconds = 500;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("timeout cannot exceed"));

        let mut config = PowderConfig::default();
        config.defaults.max_drive_hours = 30.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_non_http_url() {
        let mut config = PowderConfig::default();
        config.routing.base_url = "ftp://example.com".to_string();
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("Routing API base URL"));
    }

    #[test]
    fn test_apply_defaults_repairs_empty_values() {
        let mut config = PowderConfig::default();
        config.llm.model.clear();
        config.cache.ttl_hours = 0;
        config.defaults.max_drive_hours = 0.0;
        config.apply_defaults();
        assert_eq!(config.llm.model, "anthropic/claude-haiku-4-5-20251001");
        assert_eq!(config.cache.ttl_hours, 6);
        assert_eq!(config.defaults.max_drive_hours, 3.0);
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[defaults]\nlocation = \"nyc\"\nmax_drive_hours = 4.5\n\n[logging]\nformat = \"json\""
        )
        .unwrap();

        let config = PowderConfig::load_from_path(Some(path)).unwrap();
        assert_eq!(config.defaults.location, "nyc");
        assert_eq!(config.defaults.max_drive_hours, 4.5);
        assert_eq!(config.logging.format, "json");
        // untouched sections keep their defaults
        assert_eq!(config.routing.profile, "driving-car");
    }

    #[test]
    fn test_cache_location_expands_home() {
        let config = CacheConfig::default();
        let resolved = config.resolved_location();
        assert!(resolved.ends_with(".cache/powder"));
        assert!(!resolved.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_config_path_generation() {
        let path = PowderConfig::get_config_path();
        assert!(path.is_some());
        let path = path.unwrap();
        assert!(path.to_string_lossy().contains("powder"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }
}
