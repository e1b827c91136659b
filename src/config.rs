use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::WarehouseError;

const DEFAULT_API_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POOL_SIZE: usize = 4;
const DEFAULT_RAW_DATA_DIR: &str = "data/raw";

/// Runtime settings, read from the environment (and a `.env` file when present).
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub database_url: Option<String>,
    pub api_base_url: Option<String>,
    pub api_timeout: Duration,
    pub raw_data_dir: PathBuf,
    pub pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            api_base_url: None,
            api_timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            raw_data_dir: PathBuf::from(DEFAULT_RAW_DATA_DIR),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl WarehouseConfig {
    pub fn from_env() -> Result<Self, WarehouseError> {
        match dotenvy::dotenv() {
            Ok(path) => info!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => warn!("Ignoring unreadable .env file: {}", e),
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WarehouseError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_timeout = match non_empty("API_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number(&raw, "API_TIMEOUT_SECS")?),
            None => defaults.api_timeout,
        };

        let pool_size = match non_empty("DATABASE_POOL_SIZE") {
            Some(raw) => parse_number::<usize>(&raw, "DATABASE_POOL_SIZE")?,
            None => defaults.pool_size,
        };
        if pool_size == 0 {
            return Err(WarehouseError::ConfigError {
                message: "DATABASE_POOL_SIZE must be at least 1".to_string(),
            });
        }

        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            api_base_url: non_empty("API_BASE_URL"),
            api_timeout,
            raw_data_dir: non_empty("RAW_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.raw_data_dir),
            pool_size,
        })
    }

    pub fn require_database_url(&self) -> Result<&str, WarehouseError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| WarehouseError::ConfigError {
                message: "DATABASE_URL environment variable is required".to_string(),
            })
    }

    pub fn require_api_base_url(&self) -> Result<&str, WarehouseError> {
        self.api_base_url
            .as_deref()
            .ok_or_else(|| WarehouseError::ConfigError {
                message: "API_BASE_URL environment variable is required".to_string(),
            })
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T, WarehouseError> {
    raw.trim().parse().map_err(|_| WarehouseError::ConfigError {
        message: format!("{} must be a non-negative integer, got {:?}", key, raw),
    })
}

/// Hides the user-info part of a connection URL before it reaches the logs.
pub fn mask_database_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    match rest.rfind('@') {
        Some(at) => format!("{}://***@{}", &url[..scheme_end], &rest[at + 1..]),
        None => url.to_string(),
    }
}
