//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use attendance_core::EngineConfig;
use chrono::FixedOffset;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where sessions and attendance records are kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres {
        database_url: String,
        max_connections: u32,
    },
    /// Process-local storage, seeded with courses and rosters from a JSON file.
    Memory { seed_path: Option<PathBuf> },
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub storage: StorageBackend,
    pub log_level: Level,
    pub session_duration_secs: i64,
    pub expiry_poll_interval: Duration,
    pub utc_offset_minutes: i32,
    pub finalize_max_attempts: u32,
    pub finalize_retry_delay: Duration,
    pub cors_allowed_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Server ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_allowed_origin = lookup("CORS_ALLOWED_ORIGIN")
            .unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Storage ---
        let backend = lookup("STORAGE_BACKEND").unwrap_or_else(|| "postgres".to_string());
        let storage = match backend.to_lowercase().as_str() {
            "postgres" => StorageBackend::Postgres {
                database_url: lookup("DATABASE_URL")
                    .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            },
            "memory" => StorageBackend::Memory {
                seed_path: lookup("MEMORY_SEED_PATH").map(PathBuf::from),
            },
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORAGE_BACKEND".to_string(),
                    format!("'{}' is neither 'postgres' nor 'memory'", other),
                ))
            }
        };

        // --- Attendance engine ---
        let session_duration_secs: i64 = parse_or(&lookup, "SESSION_DURATION_SECS", 900)?;
        if session_duration_secs <= 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_DURATION_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let poll_ms: u64 = parse_or(&lookup, "EXPIRY_POLL_INTERVAL_MS", 1000)?;
        if poll_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "EXPIRY_POLL_INTERVAL_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let utc_offset_minutes: i32 = parse_or(&lookup, "ATTENDANCE_UTC_OFFSET_MINUTES", 0)?;
        if FixedOffset::east_opt(utc_offset_minutes * 60).is_none() {
            return Err(ConfigError::InvalidValue(
                "ATTENDANCE_UTC_OFFSET_MINUTES".to_string(),
                format!("{} minutes is not a valid UTC offset", utc_offset_minutes),
            ));
        }

        let finalize_max_attempts: u32 = parse_or(&lookup, "FINALIZE_MAX_ATTEMPTS", 3)?;
        let retry_ms: u64 = parse_or(&lookup, "FINALIZE_RETRY_DELAY_MS", 250)?;

        Ok(Self {
            bind_address,
            storage,
            log_level,
            session_duration_secs,
            expiry_poll_interval: Duration::from_millis(poll_ms),
            utc_offset_minutes,
            finalize_max_attempts,
            finalize_retry_delay: Duration::from_millis(retry_ms),
            cors_allowed_origin,
        })
    }

    /// The settings handed to the attendance engine.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let day_offset = FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            ConfigError::InvalidValue(
                "ATTENDANCE_UTC_OFFSET_MINUTES".to_string(),
                self.utc_offset_minutes.to_string(),
            )
        })?;
        EngineConfig::new(
            chrono::Duration::seconds(self.session_duration_secs),
            day_offset,
            self.finalize_max_attempts,
            self.finalize_retry_delay,
        )
        .map_err(|e| ConfigError::InvalidValue("engine".to_string(), e.to_string()))
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("'{}': {}", raw, e))),
        None => Ok(default),
    }
}
