//! Application configuration from environment variables.
//!
//! Load configuration using `Config::from_env()` after calling `dotenvy::dotenv()`.

use std::path::PathBuf;
use std::time::Duration;

use crate::core::auth::jwt::{JwtConfig, JwtError};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DB_PATH: &str = "db.json";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT_SECRET environment variable not set")]
    MissingSecret,

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

impl From<JwtError> for ConfigError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::MissingSecret => ConfigError::MissingSecret,
            JwtError::InvalidConfig { key, value } => ConfigError::InvalidValue { key, value },
            other => ConfigError::InvalidValue {
                key: "JWT",
                value: other.to_string(),
            },
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port
    pub port: u16,

    /// Path of the JSON store file
    pub db_path: PathBuf,

    /// bcrypt cost for passwords and refresh tokens
    pub bcrypt_cost: u32,

    /// Period of the expired-session reaper; `None` disables it
    pub session_reaper_interval: Option<Duration>,

    /// Mark the refresh cookie `Secure`
    pub secure_cookies: bool,

    /// Access token signing settings
    pub jwt: JwtConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv()` before this to load from `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt = JwtConfig::from_lookup(&lookup)?;

        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;

        let db_path = lookup("DB_PATH")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let bcrypt_cost = parse_or(&lookup, "BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::InvalidValue {
                key: "BCRYPT_COST",
                value: bcrypt_cost.to_string(),
            });
        }

        let reaper_secs: u64 = parse_or(&lookup, "SESSION_REAPER_INTERVAL_SECS", 0)?;
        let session_reaper_interval = (reaper_secs > 0).then(|| Duration::from_secs(reaper_secs));

        let secure_cookies = parse_or(&lookup, "COOKIE_SECURE", false)?;

        Ok(Self {
            port,
            db_path,
            bcrypt_cost,
            session_reaper_interval,
            secure_cookies,
            jwt,
        })
    }

    /// Check if the session reaper should run
    pub fn has_session_reaper(&self) -> bool {
        self.session_reaper_interval.is_some()
    }
}

/// Parse `key` if set and non-empty, otherwise use `default`
fn parse_or<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}
