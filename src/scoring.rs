//! # Recipe Scoring Module
//!
//! Pure, deterministic scoring and classification of recipes from their
//! ingredient lists. Nothing here performs I/O; absent fields contribute
//! zero instead of raising errors.
//!
//! ## Features
//!
//! - Ingredient match score (fraction of query ingredients found in a recipe)
//! - Preference score (fixed bonus per satisfied preference)
//! - Stable ranking by combined score
//! - Vegetarian classification from a denylist of animal products
//! - Calorie and cooking-time estimation
//!
//! The vegetarian check is plain substring matching, so "hamburger bun"
//! is classified as containing "ham". Whole-word matching would change
//! results for real recipes ("chicken-style stock", "fishcakes"), so the
//! heuristic is kept as-is.

use log::{debug, info, trace};

use crate::measure::quantity_or_one;
use crate::recipe_model::{AnnotatedRecipe, CookingTime, Recipe};

/// Bonus added for each satisfied preference
pub const PREFERENCE_BONUS: f64 = 0.5;

/// Estimates below this value are raised to it
pub const MIN_CALORIES: u32 = 100;

/// Base preparation time in minutes
pub const BASE_COOKING_MINUTES: u32 = 10;

/// Minutes added per instruction step
pub const MINUTES_PER_STEP: u32 = 2;

/// Ingredient substrings that make a recipe non-vegetarian
pub const NON_VEGETARIAN_INGREDIENTS: &[&str] = &[
    "chicken", "beef", "pork", "lamb", "fish", "shrimp", "prawn", "meat", "bacon", "ham",
    "turkey", "duck", "veal", "anchovy", "gelatin",
];

/// Calories per unit quantity for common ingredient keywords
pub const CALORIES_PER_INGREDIENT: &[(&str, u32)] = &[
    ("rice", 130),
    ("potato", 77),
    ("chicken", 165),
    ("beef", 250),
    ("pork", 242),
    ("fish", 206),
    ("egg", 78),
    ("milk", 42),
    ("cheese", 113),
    ("butter", 102),
    ("oil", 120),
    ("flour", 364),
    ("sugar", 387),
    ("bread", 265),
    ("pasta", 131),
];

/// A user preference taken into account when ranking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preference {
    /// Preferred cuisine, matched against the recipe title
    Cuisine(String),
}

impl Preference {
    /// Build a preference from a free-form key/value pair
    ///
    /// Unknown keys yield `None`.
    pub fn from_pair(key: &str, value: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "cuisine" => Some(Preference::Cuisine(value.trim().to_string())),
            other => {
                debug!("Ignoring unsupported preference key '{}'", other);
                None
            }
        }
    }

    /// Score contribution of this preference for a recipe
    fn score(&self, recipe: &Recipe) -> f64 {
        match self {
            Preference::Cuisine(cuisine) => {
                if !cuisine.is_empty() && contains_ignore_case(&recipe.title, cuisine) {
                    PREFERENCE_BONUS
                } else {
                    0.0
                }
            }
        }
    }
}

/// A recipe with its scores for one ranking pass
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRecipe {
    pub recipe: Recipe,
    pub match_score: f64,
    pub preference_score: f64,
}

impl RankedRecipe {
    /// Combined score used for ordering
    pub fn total_score(&self) -> f64 {
        self.match_score + self.preference_score
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Fraction of query ingredients found in the recipe's ingredient names
///
/// Matching is case-insensitive substring matching. An empty query scores 0.
/// Blank query entries count towards the total but never match.
///
/// # Examples
///
/// ```rust
/// use kitchen_chef::recipe_model::{IngredientSlot, Recipe};
/// use kitchen_chef::scoring::ingredient_match_score;
///
/// let recipe = Recipe::new("1", "Fried rice")
///     .with_ingredient(IngredientSlot::new("Basmati Rice"))
///     .with_ingredient(IngredientSlot::new("egg"));
///
/// let query = vec!["rice".to_string(), "tofu".to_string()];
/// assert_eq!(ingredient_match_score(&recipe, &query), 0.5);
/// assert_eq!(ingredient_match_score(&recipe, &[]), 0.0);
/// ```
pub fn ingredient_match_score(recipe: &Recipe, query_ingredients: &[String]) -> f64 {
    if query_ingredients.is_empty() {
        return 0.0;
    }

    let names: Vec<String> = recipe
        .ingredient_names()
        .map(|name| name.to_lowercase())
        .collect();

    let matched = query_ingredients
        .iter()
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty() && names.iter().any(|name| name.contains(q.as_str())))
        .count();

    matched as f64 / query_ingredients.len() as f64
}

/// Sum of preference bonuses for a recipe
pub fn preference_score(recipe: &Recipe, preferences: &[Preference]) -> f64 {
    preferences.iter().map(|p| p.score(recipe)).sum()
}

/// Score and order recipes by combined score, highest first
///
/// The sort is stable: recipes with equal scores keep their input order.
pub fn rank(
    recipes: Vec<Recipe>,
    query_ingredients: &[String],
    preferences: &[Preference],
) -> Vec<RankedRecipe> {
    let mut ranked: Vec<RankedRecipe> = recipes
        .into_iter()
        .map(|recipe| {
            let match_score = ingredient_match_score(&recipe, query_ingredients);
            let preference_score = preference_score(&recipe, preferences);
            trace!(
                "Scored recipe {}: match={:.2}, preference={:.2}",
                recipe.id,
                match_score,
                preference_score
            );
            RankedRecipe {
                recipe,
                match_score,
                preference_score,
            }
        })
        .collect();

    // slice::sort_by is stable
    ranked.sort_by(|a, b| b.total_score().total_cmp(&a.total_score()));

    info!(
        "Ranked {} recipes against {} ingredients and {} preferences",
        ranked.len(),
        query_ingredients.len(),
        preferences.len()
    );
    ranked
}

/// Rank recipes by ingredient overlap alone
pub fn recommend(recipes: Vec<Recipe>, query_ingredients: &[String]) -> Vec<RankedRecipe> {
    rank(recipes, query_ingredients, &[])
}

/// Whether no ingredient name contains a denylisted animal product
pub fn is_vegetarian(recipe: &Recipe) -> bool {
    !recipe.ingredient_names().any(|name| {
        let name = name.to_lowercase();
        NON_VEGETARIAN_INGREDIENTS
            .iter()
            .any(|non_veg| name.contains(non_veg))
    })
}

/// Rough calorie estimate, never below [`MIN_CALORIES`]
///
/// Each ingredient adds the calories of every keyword it contains, times the
/// leading number of its measure. The sum is divided by 4 and rounded.
pub fn estimate_calories(recipe: &Recipe) -> u32 {
    let total: f64 = recipe
        .slots()
        .map(|slot| {
            let name = slot.ingredient.to_lowercase();
            let quantity = quantity_or_one(slot.measure.as_deref());
            CALORIES_PER_INGREDIENT
                .iter()
                .filter(|(keyword, _)| name.contains(keyword))
                .map(|(_, calories)| f64::from(*calories) * quantity)
                .sum::<f64>()
        })
        .sum();

    let estimate = (total / 4.0).round();
    if estimate.is_finite() && estimate > f64::from(MIN_CALORIES) {
        estimate.min(f64::from(u32::MAX)) as u32
    } else {
        MIN_CALORIES
    }
}

/// Count instruction steps separated by newlines, periods or semicolons
pub fn count_steps(instructions: &str) -> usize {
    instructions
        .split(['\n', '.', ';'])
        .filter(|step| !step.trim().is_empty())
        .count()
}

/// Bucketed cooking time from the instruction text
///
/// Missing or blank instructions default to "30 min".
pub fn estimate_cooking_time(instructions: Option<&str>) -> CookingTime {
    let Some(instructions) = instructions.filter(|text| !text.trim().is_empty()) else {
        return CookingTime::ThirtyMinutes;
    };

    let steps = u32::try_from(count_steps(instructions)).unwrap_or(u32::MAX);
    let minutes = BASE_COOKING_MINUTES.saturating_add(steps.saturating_mul(MINUTES_PER_STEP));
    CookingTime::from_minutes(minutes)
}

/// Compute every derived field of a recipe
pub fn annotate(recipe: Recipe) -> AnnotatedRecipe {
    AnnotatedRecipe {
        is_vegetarian: is_vegetarian(&recipe),
        estimated_calories: estimate_calories(&recipe),
        cooking_time: estimate_cooking_time(recipe.instructions.as_deref()),
        recipe,
    }
}

/// Whether a recipe can be shown in a list
///
/// Requires an http(s) thumbnail and excludes "migas", whose API entry is broken.
pub fn is_displayable(recipe: &Recipe) -> bool {
    let has_image = recipe
        .image_url
        .as_deref()
        .is_some_and(|url| url.starts_with("http"));
    has_image && !contains_ignore_case(&recipe.title, "migas")
}

/// Trim, lowercase, drop blanks and sort ingredient names
pub fn normalize_ingredients(ingredients: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = ingredients
        .iter()
        .map(|ingredient| ingredient.trim().to_lowercase())
        .filter(|ingredient| !ingredient.is_empty())
        .collect();
    normalized.sort();
    normalized
}

/// Every ingredient is non-blank and contains no digits
pub fn validate_ingredients(ingredients: &[String]) -> bool {
    ingredients.iter().all(|ingredient| {
        !ingredient.trim().is_empty() && !ingredient.chars().any(|c| c.is_ascii_digit())
    })
}

/// Recipes that contain every query ingredient
pub fn recipes_containing_all<'a>(
    recipes: &'a [Recipe],
    query_ingredients: &[String],
) -> Vec<&'a Recipe> {
    recipes
        .iter()
        .filter(|recipe| {
            query_ingredients.iter().all(|q| {
                recipe
                    .ingredient_names()
                    .any(|name| contains_ignore_case(name, q))
            })
        })
        .collect()
}
