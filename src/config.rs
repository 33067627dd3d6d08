use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

use crate::models::{CycleSettings, DEFAULT_CYCLE_LENGTH, DEFAULT_PERIOD_LENGTH};
use crate::validation::{self, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("default cycle settings rejected: {0}")]
    Defaults(#[from] ValidationError),
}

/// Settings new profiles start from.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub default_cycle_length: u32,
    pub default_period_length: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_cycle_length: DEFAULT_CYCLE_LENGTH,
            default_period_length: DEFAULT_PERIOD_LENGTH,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            default_cycle_length: try_load(&lookup, "CYCLE_DEFAULT_LENGTH", DEFAULT_CYCLE_LENGTH)?,
            default_period_length: try_load(
                &lookup,
                "CYCLE_DEFAULT_PERIOD_LENGTH",
                DEFAULT_PERIOD_LENGTH,
            )?,
        };
        validation::validate_lengths(config.default_cycle_length, config.default_period_length)?;
        Ok(config)
    }

    pub fn default_settings(&self) -> CycleSettings {
        CycleSettings::with_lengths(self.default_cycle_length, self.default_period_length)
    }
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(value) = lookup(key) else {
        info!("{key} not set, using default: {default}");
        return Ok(default);
    };

    let parsed = value.trim().parse::<T>();
    parsed.map_err(|e| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }
    })
}
