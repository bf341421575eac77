//! # Error Types Module
//!
//! This module defines the error types shared by the offline queue, the
//! application state and the recipe API client.

/// Custom error types for the kitchen core
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Local key-value store read/write failures
    Persistence(String),
    /// Remote favorites store failures while syncing
    RemoteSync(String),
    /// Recipe API failures or malformed payloads
    Search(String),
    /// Operations that need a signed-in user
    Auth(String),
    /// Invalid or missing configuration
    Config(String),
    /// Rejected user input, such as an out-of-range review rating
    Validation(String),
}

impl AppError {
    /// Whether the failure should be shown to the user as an actionable message
    pub fn is_user_facing(&self) -> bool {
        matches!(self, AppError::Auth(_) | AppError::Validation(_))
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Persistence(msg) => write!(f, "Persistence error: {msg}"),
            AppError::RemoteSync(msg) => write!(f, "Remote sync error: {msg}"),
            AppError::Search(msg) => write!(f, "Search error: {msg}"),
            AppError::Auth(msg) => write!(f, "Authentication error: {msg}"),
            AppError::Config(msg) => write!(f, "Configuration error: {msg}"),
            AppError::Validation(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Persistence(format!("serialization failed: {err}"))
    }
}

/// Result alias used across the crate
pub type AppResult<T> = std::result::Result<T, AppError>;
