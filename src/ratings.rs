//! # Recipe Ratings
//!
//! Star reviews left on recipes and the per-recipe aggregate (average
//! rating, review count) recomputed whenever a review lands.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
pub const DEFAULT_RATING: u8 = 5;

/// A user's review of one recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub recipe_id: String,
    pub user_id: String,
    pub rating: u8,
    pub comment: String,
}

impl Review {
    /// Build a review, rejecting ratings outside 1..=5 and blank comments
    pub fn new(recipe_id: &str, user_id: &str, rating: u8, comment: &str) -> AppResult<Self> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(AppError::Validation(format!(
                "Rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }

        let comment = comment.trim();
        if comment.is_empty() {
            return Err(AppError::Validation("Please enter a comment".to_string()));
        }

        Ok(Self {
            recipe_id: recipe_id.to_string(),
            user_id: user_id.to_string(),
            rating,
            comment: comment.to_string(),
        })
    }
}

/// Aggregate rating of a recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeStats {
    /// Mean rating rounded to one decimal; 0.0 when there are no reviews
    pub average_rating: f64,
    pub total_reviews: u32,
    pub last_updated: DateTime<Utc>,
}

impl RecipeStats {
    pub fn from_ratings(ratings: &[u8]) -> Self {
        let total_reviews = ratings.len() as u32;
        let average_rating = if ratings.is_empty() {
            0.0
        } else {
            let sum: u32 = ratings.iter().map(|&r| u32::from(r)).sum();
            round_to_tenth(f64::from(sum) / f64::from(total_reviews))
        };

        Self {
            average_rating,
            total_reviews,
            last_updated: Utc::now(),
        }
    }
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Row-change notification sent by the database when a review is written
#[derive(Debug, Deserialize)]
struct ReviewWebhook {
    record: Option<WebhookRecord>,
}

#[derive(Debug, Deserialize)]
struct WebhookRecord {
    recipe_id: Option<String>,
}

/// Recipe id carried by a review-change webhook payload
pub fn recipe_id_from_webhook(payload: &str) -> AppResult<String> {
    let webhook: ReviewWebhook = serde_json::from_str(payload)
        .map_err(|e| AppError::Validation(format!("invalid webhook payload: {e}")))?;

    webhook
        .record
        .and_then(|record| record.recipe_id)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Missing recipe_id in payload".to_string()))
}

/// Hosted reviews and recipe_stats tables
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn insert_review(&self, review: &Review) -> AppResult<()>;

    /// Every rating left on a recipe
    async fn ratings(&self, recipe_id: &str) -> AppResult<Vec<u8>>;

    /// Insert or replace the aggregate row of a recipe
    async fn upsert_stats(&self, recipe_id: &str, stats: &RecipeStats) -> AppResult<()>;

    async fn stats(&self, recipe_id: &str) -> AppResult<Option<RecipeStats>>;
}

/// Recompute and store the aggregate of one recipe
pub async fn update_recipe_stats(
    store: &dyn ReviewStore,
    recipe_id: &str,
) -> AppResult<RecipeStats> {
    let ratings = store.ratings(recipe_id).await?;
    let stats = RecipeStats::from_ratings(&ratings);
    store.upsert_stats(recipe_id, &stats).await?;

    info!(
        recipe_id = %recipe_id,
        average = stats.average_rating,
        reviews = stats.total_reviews,
        "Recipe stats updated"
    );
    Ok(stats)
}

/// Store a review and refresh its recipe's aggregate
pub async fn submit_review(store: &dyn ReviewStore, review: &Review) -> AppResult<RecipeStats> {
    store.insert_review(review).await?;
    update_recipe_stats(store, &review.recipe_id).await
}

/// Initialize the reviews schema
pub async fn init_review_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing reviews schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS reviews (
            id BIGSERIAL PRIMARY KEY,
            recipe_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            rating SMALLINT NOT NULL CHECK (rating BETWEEN 1 AND 5),
            comment TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create reviews table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reviews_recipe_id ON reviews(recipe_id)")
        .execute(pool)
        .await
        .context("Failed to create reviews index")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS recipe_stats (
            recipe_id TEXT PRIMARY KEY,
            average_rating DOUBLE PRECISION NOT NULL,
            total_reviews INTEGER NOT NULL,
            last_updated TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create recipe_stats table")?;

    info!("Reviews schema initialized successfully");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgReviewStore {
    pool: PgPool,
}

impl PgReviewStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await
            .context("Failed to connect to reviews database")?;

        init_review_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool; the schema must already be initialized
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn review_error(action: &str, err: sqlx::Error) -> AppError {
    AppError::RemoteSync(format!("failed to {action}: {err}"))
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    async fn insert_review(&self, review: &Review) -> AppResult<()> {
        debug!(recipe_id = %review.recipe_id, rating = review.rating, "Inserting review");
        sqlx::query(
            "INSERT INTO reviews (recipe_id, user_id, rating, comment) VALUES ($1, $2, $3, $4)",
        )
        .bind(&review.recipe_id)
        .bind(&review.user_id)
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .execute(&self.pool)
        .await
        .map_err(|e| review_error("insert review", e))?;
        Ok(())
    }

    async fn ratings(&self, recipe_id: &str) -> AppResult<Vec<u8>> {
        let rows = sqlx::query_scalar::<_, i16>("SELECT rating FROM reviews WHERE recipe_id = $1")
            .bind(recipe_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| review_error("load ratings", e))?;

        rows.into_iter()
            .map(|rating| {
                u8::try_from(rating)
                    .map_err(|_| AppError::RemoteSync(format!("rating {rating} out of range")))
            })
            .collect()
    }

    async fn upsert_stats(&self, recipe_id: &str, stats: &RecipeStats) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO recipe_stats (recipe_id, average_rating, total_reviews, last_updated)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (recipe_id) DO UPDATE
             SET average_rating = EXCLUDED.average_rating,
                 total_reviews = EXCLUDED.total_reviews,
                 last_updated = EXCLUDED.last_updated",
        )
        .bind(recipe_id)
        .bind(stats.average_rating)
        .bind(stats.total_reviews as i32)
        .bind(stats.last_updated)
        .execute(&self.pool)
        .await
        .map_err(|e| review_error("upsert recipe stats", e))?;
        Ok(())
    }

    async fn stats(&self, recipe_id: &str) -> AppResult<Option<RecipeStats>> {
        let row = sqlx::query_as::<_, (f64, i32, DateTime<Utc>)>(
            "SELECT average_rating, total_reviews, last_updated FROM recipe_stats WHERE recipe_id = $1",
        )
        .bind(recipe_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| review_error("load recipe stats", e))?;

        Ok(row.map(|(average_rating, total_reviews, last_updated)| RecipeStats {
            average_rating,
            total_reviews: total_reviews.max(0) as u32,
            last_updated,
        }))
    }
}

#[derive(Debug, Default)]
pub struct MemoryReviewStore {
    reviews: Mutex<Vec<Review>>,
    stats: Mutex<HashMap<String, RecipeStats>>,
}

impl MemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewStore for MemoryReviewStore {
    async fn insert_review(&self, review: &Review) -> AppResult<()> {
        self.reviews.lock().await.push(review.clone());
        Ok(())
    }

    async fn ratings(&self, recipe_id: &str) -> AppResult<Vec<u8>> {
        Ok(self
            .reviews
            .lock()
            .await
            .iter()
            .filter(|review| review.recipe_id == recipe_id)
            .map(|review| review.rating)
            .collect())
    }

    async fn upsert_stats(&self, recipe_id: &str, stats: &RecipeStats) -> AppResult<()> {
        self.stats
            .lock()
            .await
            .insert(recipe_id.to_string(), stats.clone());
        Ok(())
    }

    async fn stats(&self, recipe_id: &str) -> AppResult<Option<RecipeStats>> {
        Ok(self.stats.lock().await.get(recipe_id).cloned())
    }
}
