//! Server configuration from environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::elevation::DEFAULT_BATCH_SIZE;
use crate::simplify::DEFAULT_TOLERANCE;

pub const DEFAULT_ELEVATION_API_URL: &str = "https://api.open-elevation.com/api/v1/lookup";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub storage_root: PathBuf,
    pub elevation_api_url: String,
    pub elevation_batch_size: usize,
    pub elevation_timeout: Duration,
    pub elevation_backfill: bool,
    pub max_upload_bytes: usize,
    pub upload_limit: u32,
    pub upload_window: Duration,
    pub simplify_tolerance: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from any variable source; unset variables take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            bind_addr: parse_or(&var, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            database_url: var("DATABASE_URL"),
            storage_root: var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/track-files")),
            elevation_api_url: var("ELEVATION_API_URL")
                .unwrap_or_else(|| DEFAULT_ELEVATION_API_URL.to_string()),
            elevation_batch_size: positive(parse_or(
                &var,
                "ELEVATION_BATCH_SIZE",
                DEFAULT_BATCH_SIZE,
            )?, "ELEVATION_BATCH_SIZE")?,
            elevation_timeout: Duration::from_secs(parse_or(&var, "ELEVATION_TIMEOUT_SECS", 10)?),
            elevation_backfill: parse_or(&var, "ELEVATION_BACKFILL", true)?,
            max_upload_bytes: positive(
                parse_or(&var, "MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
                "MAX_UPLOAD_BYTES",
            )?,
            upload_limit: parse_or(&var, "UPLOAD_LIMIT", 10)?,
            upload_window: Duration::from_secs(parse_or(&var, "UPLOAD_WINDOW_SECS", 3600)?),
            simplify_tolerance: parse_or(&var, "SIMPLIFY_TOLERANCE", DEFAULT_TOLERANCE)?,
        })
    }
}

fn parse_or<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw,
        }),
        None => Ok(default),
    }
}

fn positive(value: usize, name: &'static str) -> Result<usize, ConfigError> {
    if value == 0 {
        Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        })
    } else {
        Ok(value)
    }
}
