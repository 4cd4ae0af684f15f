//! Engine run configuration.
//!
//! A small TOML file says which countries to run, where the country
//! profiles live and how to log. `.env` and the process environment can
//! override a few keys for scheduled jobs:
//!
//! | variable                | overrides                 |
//! |-------------------------|---------------------------|
//! | `IBF_ENGINE_LOG_LEVEL`  | `logging.level`           |
//! | `IBF_ENGINE_WORKERS`    | `workers`                 |
//! | `IBF_ENGINE_COUNTRIES`  | `countries` (comma list)  |

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::countries::CountryRegistry;
use crate::engine::DEFAULT_MAX_FORECAST_AGE_HOURS;
use crate::model::ProfileError;

pub const ENV_LOG_LEVEL: &str = "IBF_ENGINE_LOG_LEVEL";
pub const ENV_WORKERS: &str = "IBF_ENGINE_WORKERS";
pub const ENV_COUNTRIES: &str = "IBF_ENGINE_COUNTRIES";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error(transparent)]
    Profiles(#[from] ProfileError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    /// Append-only log file, mirrored from stderr.
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            timestamps: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// ISO3 codes to run; empty runs every registry country.
    pub countries: Vec<String>,
    /// External country profile table; `None` uses the built-in one.
    pub profiles: Option<PathBuf>,
    pub max_forecast_age_hours: i64,
    pub workers: Option<usize>,
    /// JSON-lines output; `None` writes to stdout.
    pub output: Option<PathBuf>,
    /// Fail the run if no credential backend resolves.
    pub require_credentials: bool,
    pub secrets_file: Option<PathBuf>,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            countries: Vec::new(),
            profiles: None,
            max_forecast_age_hours: DEFAULT_MAX_FORECAST_AGE_HOURS,
            workers: None,
            output: None,
            require_credentials: false,
            secrets_file: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the file, loads `.env`, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text, &path.display().to_string())?;

        dotenv::dotenv().ok();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies overrides from `lookup` (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(workers) = lookup(ENV_WORKERS) {
            let workers = workers.trim().parse::<usize>().map_err(|e| ConfigError::InvalidValue {
                key: ENV_WORKERS.to_string(),
                reason: e.to_string(),
            })?;
            self.workers = Some(workers);
        }
        if let Some(countries) = lookup(ENV_COUNTRIES) {
            self.countries = countries
                .split(',')
                .map(|c| c.trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty())
                .collect();
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_forecast_age_hours <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_forecast_age_hours".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.workers == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "workers".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Loads the country registry and narrows it to `countries`.
    pub fn registry(&self) -> Result<CountryRegistry, ConfigError> {
        let registry = match &self.profiles {
            Some(path) => CountryRegistry::load(path)?,
            None => CountryRegistry::builtin()?,
        };
        Ok(registry.restrict_to(&self.countries)?)
    }
}
