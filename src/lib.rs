//! # Kitchen Chef
//!
//! Recipe discovery backend: TheMealDB search, heuristic recipe scoring
//! (ingredient match, vegetarian flag, calories, cooking time) and a
//! favorites list that keeps working offline and syncs once back online,
//! plus star reviews with per-recipe rating aggregates.

pub mod app_state;
pub mod circuit_breaker;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod favorites;
pub mod mealdb;
pub mod measure;
pub mod offline_queue;
pub mod ratings;
pub mod recipe_model;
pub mod remote;
pub mod scoring;
pub mod settings;
pub mod storage;
