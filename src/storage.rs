//! # Local Key-Value Storage
//!
//! Durable string key-value storage used for the offline action log, the
//! favorite set and the push notification settings. Values are opaque
//! strings; callers serialize with `serde_json`.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

/// Key of the serialized offline action log
pub const OFFLINE_ACTIONS_KEY: &str = "offlineActions";
/// Key of the serialized favorite set
pub const FAVORITES_KEY: &str = "favorites";
/// Key of the serialized push notification settings
pub const PUSH_SETTINGS_KEY: &str = "pushSettings";

/// Durable string key-value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key is absent
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Insert or replace a value
    async fn set(&self, key: &str, value: &str) -> AppResult<()>;

    /// Delete a key; deleting an absent key is not an error
    async fn remove(&self, key: &str) -> AppResult<()>;
}

/// Read and deserialize a JSON value
///
/// Malformed payloads are logged and treated as absent so a corrupt entry
/// never blocks startup.
pub async fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> AppResult<Option<T>> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(key = %key, error = %e, "Discarding malformed stored value");
            Ok(None)
        }
    }
}

/// Serialize a value as JSON and store it
pub async fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> AppResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}

/// Initialize the key-value table
pub async fn init_kv_schema(pool: &SqlitePool) -> Result<()> {
    info!("Initializing local key-value schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create kv_store table")?;

    info!("Local key-value schema initialized successfully");
    Ok(())
}

/// SQLite-backed key-value store
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Open (or create) the SQLite file at `path` and ensure the schema exists
    pub async fn open(path: &str) -> Result<Self> {
        info!("Opening local database at: {}", path);

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open local database at {path}"))?;

        init_kv_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Open a private in-memory SQLite database
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Failed to parse in-memory SQLite URL")?;

        // A single connection keeps the in-memory database alive and shared
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        init_kv_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool; the schema must already be initialized
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn persistence_error(action: &str, key: &str, err: sqlx::Error) -> AppError {
    AppError::Persistence(format!("failed to {action} key '{key}': {err}"))
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        debug!(key = %key, "Reading local value");
        sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| persistence_error("read", key, e))
    }

    async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        debug!(key = %key, bytes = value.len(), "Writing local value");
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| persistence_error("write", key, e))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        debug!(key = %key, "Removing local value");
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| persistence_error("remove", key, e))?;
        Ok(())
    }
}

/// Process-local key-value store
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        self.values.lock().await.remove(key);
        Ok(())
    }
}
