//! # Configuration Module
//!
//! This module defines configuration structures for the recipe API client,
//! including recovery settings and the environment-driven application config.

use std::env;

use crate::error::{AppError, AppResult};

// Constants for application configuration
pub const DEFAULT_MEALDB_BASE_URL: &str = "https://www.themealdb.com/api/json/v1/1";
pub const DEFAULT_LOCAL_DB_PATH: &str = "kitchen_chef.db";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Recovery configuration for error handling
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Timeout for a single HTTP request in seconds
    pub operation_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_retry_delay_ms: 250,
            max_retry_delay_ms: 4000,
            operation_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

/// Configuration for the TheMealDB client
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL without trailing slash
    pub base_url: String,
    /// Retry and circuit breaker settings
    pub recovery: RecoveryConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_MEALDB_BASE_URL.to_string(),
            recovery: RecoveryConfig::default(),
        }
    }
}

/// Top-level configuration read from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path of the SQLite file backing the local key-value store
    pub local_db_path: String,
    /// PostgreSQL URL of the remote favorites store, if any
    pub remote_database_url: Option<String>,
    /// Signed-in user id handed over by the auth provider
    pub user_id: Option<String>,
    /// Recipe API settings
    pub api: ApiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            local_db_path: DEFAULT_LOCAL_DB_PATH.to_string(),
            remote_database_url: None,
            user_id: None,
            api: ApiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Build the configuration from environment variables
    ///
    /// Call `dotenv::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = AppConfig::default();

        if let Some(path) = non_empty("KITCHEN_CHEF_DB") {
            config.local_db_path = path;
        }
        config.remote_database_url = non_empty("DATABASE_URL");
        config.user_id = non_empty("KITCHEN_CHEF_USER_ID");

        if let Some(url) = non_empty("MEALDB_BASE_URL") {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(AppError::Config(format!(
                    "MEALDB_BASE_URL must be an http(s) URL, got '{url}'"
                )));
            }
            config.api.base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(retries) = non_empty("MEALDB_MAX_RETRIES") {
            config.api.recovery.max_retries = retries.parse().map_err(|_| {
                AppError::Config(format!("MEALDB_MAX_RETRIES must be a number, got '{retries}'"))
            })?;
        }

        Ok(config)
    }

    /// Whether a durable remote favorites store is configured
    pub fn has_remote(&self) -> bool {
        self.remote_database_url.is_some()
    }

    /// Initial connectivity for a run
    ///
    /// Without a remote store the state stays offline so favorite changes
    /// remain queued instead of draining into a replica that dies with the
    /// process.
    pub fn starts_online(&self, offline_flag: bool) -> bool {
        !offline_flag && self.has_remote()
    }
}
