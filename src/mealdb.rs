//! # Recipe API Client
//!
//! Thin TheMealDB v1 client. Requests are retried with jittered exponential
//! backoff and guarded by a circuit breaker. Public calls never fail: errors
//! are logged and surface as empty results so list views can still render.

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{ApiConfig, RecoveryConfig};
use crate::error::{AppError, AppResult};
use crate::recipe_model::{MealDbMeal, Recipe};
use crate::scoring::{is_displayable, normalize_ingredients};

/// Envelope of every TheMealDB list response; `meals` is null when nothing matched
#[derive(Debug, Deserialize)]
struct MealsResponse {
    #[serde(default)]
    meals: Option<Vec<MealDbMeal>>,
}

/// A failed attempt and whether it is worth retrying
struct AttemptError {
    error: AppError,
    retryable: bool,
}

impl AttemptError {
    fn transient(error: AppError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    fn permanent(error: AppError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

/// Delay before retry number `attempt` (1-based)
pub fn retry_delay(recovery: &RecoveryConfig, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(8);
    let backoff = recovery
        .base_retry_delay_ms
        .saturating_mul(1_u64 << exp)
        .min(recovery.max_retry_delay_ms);
    let jitter = rand::thread_rng().gen_range(0..=(backoff / 5).max(1));
    Duration::from_millis(backoff.saturating_add(jitter))
}

/// Capitalize a cuisine name the way TheMealDB spells areas ("italian" -> "Italian")
pub fn capitalize_cuisine(cuisine: &str) -> String {
    let cuisine = cuisine.trim();
    let mut chars = cuisine.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Ids present in every result list, in order of first appearance
pub fn intersect_ids(results: &[Vec<Recipe>]) -> Vec<String> {
    let Some((first, rest)) = results.split_first() else {
        return Vec::new();
    };

    let others: Vec<HashSet<&str>> = rest
        .iter()
        .map(|recipes| recipes.iter().map(|r| r.id.as_str()).collect())
        .collect();

    let mut seen = HashSet::new();
    first
        .iter()
        .map(|r| r.id.as_str())
        .filter(|id| seen.insert(*id))
        .filter(|id| others.iter().all(|set| set.contains(id)))
        .map(str::to_string)
        .collect()
}

pub struct RecipeApi {
    client: reqwest::Client,
    base_url: String,
    recovery: RecoveryConfig,
    breaker: CircuitBreaker,
}

impl RecipeApi {
    pub fn new(config: &ApiConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.recovery.operation_timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            recovery: config.recovery.clone(),
            breaker: CircuitBreaker::new(&config.recovery),
        })
    }

    /// Recipes whose name matches `query`
    pub async fn search(&self, query: &str) -> Vec<Recipe> {
        self.fetch_or_empty("search.php", &[("s", query.trim())]).await
    }

    /// Full details of one recipe
    pub async fn lookup(&self, id: &str) -> Option<Recipe> {
        self.fetch_or_empty("lookup.php", &[("i", id)])
            .await
            .into_iter()
            .next()
    }

    /// Consecutive upstream failures seen by the circuit breaker
    pub fn consecutive_failures(&self) -> u32 {
        self.breaker.failure_count()
    }

    /// Summaries (id, title, thumbnail) of recipes using one ingredient
    pub async fn filter_by_ingredient(&self, ingredient: &str) -> Vec<Recipe> {
        self.fetch_or_empty("filter.php", &[("i", ingredient.trim())])
            .await
    }

    /// Displayable recipes of one cuisine
    pub async fn filter_by_cuisine(&self, cuisine: &str) -> Vec<Recipe> {
        let area = capitalize_cuisine(cuisine);
        if area.is_empty() {
            return Vec::new();
        }

        self.fetch_or_empty("filter.php", &[("a", area.as_str())])
            .await
            .into_iter()
            .filter(is_displayable)
            .collect()
    }

    /// Displayable recipes that use every given ingredient, with full details
    pub async fn search_by_ingredients(&self, ingredients: &[String]) -> Vec<Recipe> {
        let ingredients = normalize_ingredients(ingredients);
        if ingredients.is_empty() {
            return Vec::new();
        }

        let mut results = Vec::with_capacity(ingredients.len());
        for ingredient in &ingredients {
            match self.fetch("filter.php", &[("i", ingredient.as_str())]).await {
                Ok(recipes) => results.push(recipes),
                Err(e) => {
                    error!(ingredient = %ingredient, error = %e, "Ingredient search failed");
                    return Vec::new();
                }
            }
        }

        let ids = intersect_ids(&results);
        info!(
            ingredients = ingredients.len(),
            matches = ids.len(),
            "Recipes share every ingredient"
        );

        let mut recipes = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(recipe) = self.lookup(id).await {
                if is_displayable(&recipe) {
                    recipes.push(recipe);
                }
            }
        }
        recipes
    }

    async fn fetch_or_empty(&self, endpoint: &str, params: &[(&str, &str)]) -> Vec<Recipe> {
        match self.fetch(endpoint, params).await {
            Ok(recipes) => recipes,
            Err(e) => {
                error!(endpoint = %endpoint, error = %e, "Recipe API request failed");
                Vec::new()
            }
        }
    }

    async fn fetch(&self, endpoint: &str, params: &[(&str, &str)]) -> AppResult<Vec<Recipe>> {
        if self.breaker.is_open() {
            return Err(AppError::Search(
                "recipe service temporarily unavailable".to_string(),
            ));
        }

        let mut attempt = 0;
        loop {
            match self.request_once(endpoint, params).await {
                Ok(recipes) => {
                    self.breaker.record_success();
                    debug!(endpoint = %endpoint, count = recipes.len(), "Recipe API response");
                    return Ok(recipes);
                }
                Err(failure) => {
                    // Only upstream outages count towards opening the breaker
                    if failure.retryable {
                        self.breaker.record_failure();
                    }

                    if !failure.retryable || attempt >= self.recovery.max_retries {
                        return Err(failure.error);
                    }

                    attempt += 1;
                    let delay = retry_delay(&self.recovery, attempt);
                    warn!(
                        endpoint = %endpoint,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure.error,
                        "Retrying recipe API request"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn request_once(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<Recipe>, AttemptError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| AttemptError::transient(AppError::Search(format!("request failed: {e}"))))?;

        let status = response.status();
        if !status.is_success() {
            let error = AppError::Search(format!("unexpected status {status}"));
            return Err(if status.is_server_error() {
                AttemptError::transient(error)
            } else {
                AttemptError::permanent(error)
            });
        }

        let body: MealsResponse = response.json().await.map_err(|e| {
            AttemptError::permanent(AppError::Search(format!("invalid response body: {e}")))
        })?;

        Ok(body
            .meals
            .unwrap_or_default()
            .into_iter()
            .map(Recipe::from)
            .collect())
    }
}
