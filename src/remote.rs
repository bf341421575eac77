//! # Remote Favorites Store
//!
//! The hosted replica of each user's favorites (and push settings). Every
//! write is idempotent so a drain can be replayed wholesale after a failure.

use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::settings::PushNotificationSettings;

/// Remote favorites table
#[async_trait]
pub trait RemoteFavoriteStore: Send + Sync {
    /// Mark a recipe as favorite for a user; no-op when already present
    async fn upsert(&self, user_id: &str, recipe_id: &str) -> AppResult<()>;

    /// Remove a favorite; no-op when absent
    async fn delete(&self, user_id: &str, recipe_id: &str) -> AppResult<()>;

    /// Favorites of a user, ordered by recipe id
    async fn list(&self, user_id: &str) -> AppResult<Vec<String>>;

    /// Insert or replace the user's push notification settings
    async fn upsert_settings(
        &self,
        user_id: &str,
        settings: &PushNotificationSettings,
    ) -> AppResult<()>;
}

/// Write the given membership of `recipe_id` to the remote store
pub async fn apply_membership(
    remote: &dyn RemoteFavoriteStore,
    user_id: &str,
    recipe_id: &str,
    favorited: bool,
) -> AppResult<()> {
    if favorited {
        remote.upsert(user_id, recipe_id).await
    } else {
        remote.delete(user_id, recipe_id).await
    }
}

/// Initialize the remote schema
pub async fn init_remote_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing remote favorites schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS favorites (
            user_id TEXT NOT NULL,
            recipe_id TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (user_id, recipe_id)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create favorites table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_settings (
            user_id TEXT PRIMARY KEY,
            push_notifications JSONB NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create user_settings table")?;

    info!("Remote favorites schema initialized successfully");
    Ok(())
}

/// PostgreSQL implementation of the remote store
#[derive(Debug, Clone)]
pub struct PgFavoriteStore {
    pool: PgPool,
}

impl PgFavoriteStore {
    /// Connect and make sure the tables exist
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await
            .context("Failed to connect to remote database")?;

        init_remote_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool; the schema must already be initialized
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn remote_error(action: &str, err: sqlx::Error) -> AppError {
    AppError::RemoteSync(format!("failed to {action}: {err}"))
}

#[async_trait]
impl RemoteFavoriteStore for PgFavoriteStore {
    async fn upsert(&self, user_id: &str, recipe_id: &str) -> AppResult<()> {
        debug!(user_id = %user_id, recipe_id = %recipe_id, "Upserting remote favorite");
        sqlx::query(
            "INSERT INTO favorites (user_id, recipe_id) VALUES ($1, $2)
             ON CONFLICT (user_id, recipe_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(recipe_id)
        .execute(&self.pool)
        .await
        .map_err(|e| remote_error("upsert favorite", e))?;
        Ok(())
    }

    async fn delete(&self, user_id: &str, recipe_id: &str) -> AppResult<()> {
        debug!(user_id = %user_id, recipe_id = %recipe_id, "Deleting remote favorite");
        sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND recipe_id = $2")
            .bind(user_id)
            .bind(recipe_id)
            .execute(&self.pool)
            .await
            .map_err(|e| remote_error("delete favorite", e))?;
        Ok(())
    }

    async fn list(&self, user_id: &str) -> AppResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT recipe_id FROM favorites WHERE user_id = $1 ORDER BY recipe_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| remote_error("list favorites", e))
    }

    async fn upsert_settings(
        &self,
        user_id: &str,
        settings: &PushNotificationSettings,
    ) -> AppResult<()> {
        let payload = serde_json::to_string(settings)
            .map_err(|e| AppError::RemoteSync(format!("failed to encode settings: {e}")))?;

        sqlx::query(
            "INSERT INTO user_settings (user_id, push_notifications) VALUES ($1, $2::jsonb)
             ON CONFLICT (user_id) DO UPDATE
             SET push_notifications = EXCLUDED.push_notifications, updated_at = NOW()",
        )
        .bind(user_id)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| remote_error("upsert settings", e))?;
        Ok(())
    }
}

/// In-process replica, used when no remote database is configured
#[derive(Debug, Default)]
pub struct MemoryFavoriteStore {
    favorites: Mutex<BTreeSet<(String, String)>>,
    settings: Mutex<HashMap<String, PushNotificationSettings>>,
}

impl MemoryFavoriteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored settings for a user, if any
    pub async fn settings_for(&self, user_id: &str) -> Option<PushNotificationSettings> {
        self.settings.lock().await.get(user_id).copied()
    }
}

#[async_trait]
impl RemoteFavoriteStore for MemoryFavoriteStore {
    async fn upsert(&self, user_id: &str, recipe_id: &str) -> AppResult<()> {
        self.favorites
            .lock()
            .await
            .insert((user_id.to_string(), recipe_id.to_string()));
        Ok(())
    }

    async fn delete(&self, user_id: &str, recipe_id: &str) -> AppResult<()> {
        self.favorites
            .lock()
            .await
            .remove(&(user_id.to_string(), recipe_id.to_string()));
        Ok(())
    }

    async fn list(&self, user_id: &str) -> AppResult<Vec<String>> {
        Ok(self
            .favorites
            .lock()
            .await
            .iter()
            .filter(|(user, _)| user == user_id)
            .map(|(_, recipe)| recipe.clone())
            .collect())
    }

    async fn upsert_settings(
        &self,
        user_id: &str,
        settings: &PushNotificationSettings,
    ) -> AppResult<()> {
        self.settings
            .lock()
            .await
            .insert(user_id.to_string(), *settings);
        Ok(())
    }
}
