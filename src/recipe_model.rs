//! # Recipe Data Model
//!
//! This module defines the recipe representation used by the scoring engine
//! and the front end. Recipes arrive from TheMealDB as flat JSON objects with
//! twenty numbered `strIngredientN` / `strMeasureN` fields; they are converted
//! exactly once, at the API boundary, into a fixed array of optional slots.
//!
//! ## Core Concepts
//!
//! - **Recipe**: read-only recipe as fetched from the API
//! - **IngredientSlot**: one populated (ingredient, measure) pair
//! - **CookingTime**: bucketed cooking-time estimate
//! - **AnnotatedRecipe**: recipe plus its derived badges
//!
//! ## Usage
//!
//! ```rust
//! use kitchen_chef::recipe_model::{IngredientSlot, Recipe};
//!
//! let recipe = Recipe::new("52772", "Teriyaki Chicken Casserole")
//!     .with_ingredient(IngredientSlot::new("soy sauce").with_measure("3/4 cup"))
//!     .with_ingredient(IngredientSlot::new("chicken breasts").with_measure("2"));
//!
//! assert_eq!(recipe.ingredient_names().count(), 2);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Number of ingredient slots a TheMealDB recipe carries
pub const MAX_INGREDIENT_SLOTS: usize = 20;

/// One populated ingredient slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientSlot {
    /// Ingredient name as written by the recipe author (e.g., "chicken stock")
    pub ingredient: String,

    /// Free-text measure (e.g., "2 cups", "1/2 tsp"); `None` when blank
    pub measure: Option<String>,
}

impl IngredientSlot {
    /// Create a slot with just an ingredient name
    pub fn new(ingredient: &str) -> Self {
        Self {
            ingredient: ingredient.trim().to_string(),
            measure: None,
        }
    }

    /// Add a measure to this slot; blank measures are dropped
    pub fn with_measure(mut self, measure: &str) -> Self {
        let measure = measure.trim();
        self.measure = if measure.is_empty() {
            None
        } else {
            Some(measure.to_string())
        };
        self
    }

    /// Build a slot from raw optional fields, returning `None` for empty slots
    pub fn from_raw(ingredient: Option<&str>, measure: Option<&str>) -> Option<Self> {
        let ingredient = ingredient?.trim();
        if ingredient.is_empty() {
            return None;
        }
        Some(IngredientSlot::new(ingredient).with_measure(measure.unwrap_or("")))
    }
}

/// A read-only recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Opaque identifier (TheMealDB `idMeal`)
    pub id: String,

    /// Recipe title
    pub title: String,

    /// Free-text instructions, absent on filter results
    pub instructions: Option<String>,

    /// Fixed-size, ordered, sparse ingredient slots
    pub ingredients: [Option<IngredientSlot>; MAX_INGREDIENT_SLOTS],

    /// Cuisine / area tag (e.g., "Italian")
    pub area: Option<String>,

    /// Category (e.g., "Dessert")
    pub category: Option<String>,

    /// Thumbnail URL
    pub image_url: Option<String>,

    /// Comma separated tags
    pub tags: Option<String>,
}

impl Recipe {
    /// Create an empty recipe with an id and a title
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            instructions: None,
            ingredients: Default::default(),
            area: None,
            category: None,
            image_url: None,
            tags: None,
        }
    }

    /// Put an ingredient in the first free slot
    ///
    /// Ingredients beyond the twentieth are ignored, as the API never sends more.
    pub fn with_ingredient(mut self, slot: IngredientSlot) -> Self {
        if let Some(free) = self.ingredients.iter_mut().find(|s| s.is_none()) {
            *free = Some(slot);
        }
        self
    }

    /// Set the instructions text
    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.instructions = Some(instructions.to_string());
        self
    }

    /// Set the area tag
    pub fn with_area(mut self, area: &str) -> Self {
        self.area = Some(area.to_string());
        self
    }

    /// Set the thumbnail URL
    pub fn with_image_url(mut self, url: &str) -> Self {
        self.image_url = Some(url.to_string());
        self
    }

    /// Iterate over populated slots in order
    pub fn slots(&self) -> impl Iterator<Item = &IngredientSlot> {
        self.ingredients.iter().flatten()
    }

    /// Iterate over populated ingredient names in order
    pub fn ingredient_names(&self) -> impl Iterator<Item = &str> {
        self.slots().map(|slot| slot.ingredient.as_str())
    }

    /// Number of populated slots
    pub fn ingredient_count(&self) -> usize {
        self.slots().count()
    }
}

/// Raw meal object as returned by TheMealDB
///
/// Only used at the API boundary; numbered ingredient fields land in `extra`.
#[derive(Debug, Clone, Deserialize)]
pub struct MealDbMeal {
    #[serde(rename = "idMeal")]
    pub id_meal: String,
    #[serde(rename = "strMeal")]
    pub str_meal: String,
    #[serde(rename = "strInstructions", default)]
    pub str_instructions: Option<String>,
    #[serde(rename = "strArea", default)]
    pub str_area: Option<String>,
    #[serde(rename = "strCategory", default)]
    pub str_category: Option<String>,
    #[serde(rename = "strMealThumb", default)]
    pub str_meal_thumb: Option<String>,
    #[serde(rename = "strTags", default)]
    pub str_tags: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl MealDbMeal {
    fn numbered_field(&self, prefix: &str, index: usize) -> Option<&str> {
        self.extra
            .get(&format!("{prefix}{index}"))
            .and_then(Value::as_str)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl From<MealDbMeal> for Recipe {
    fn from(meal: MealDbMeal) -> Self {
        let mut ingredients: [Option<IngredientSlot>; MAX_INGREDIENT_SLOTS] = Default::default();
        for (i, slot) in ingredients.iter_mut().enumerate() {
            *slot = IngredientSlot::from_raw(
                meal.numbered_field("strIngredient", i + 1),
                meal.numbered_field("strMeasure", i + 1),
            );
        }

        Recipe {
            id: meal.id_meal,
            title: meal.str_meal,
            instructions: non_blank(meal.str_instructions),
            ingredients,
            area: non_blank(meal.str_area),
            category: non_blank(meal.str_category),
            image_url: non_blank(meal.str_meal_thumb),
            tags: non_blank(meal.str_tags),
        }
    }
}

/// Bucketed cooking-time estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CookingTime {
    /// Under 30 minutes
    ThirtyMinutes,
    /// 30 to 59 minutes
    FortyFiveMinutes,
    /// 60 to 89 minutes
    OneHour,
    /// 90 to 119 minutes
    NinetyMinutes,
    /// Two hours or more
    TwoHoursPlus,
}

impl CookingTime {
    /// Bucket an estimate given in minutes
    pub fn from_minutes(minutes: u32) -> Self {
        match minutes {
            0..=29 => CookingTime::ThirtyMinutes,
            30..=59 => CookingTime::FortyFiveMinutes,
            60..=89 => CookingTime::OneHour,
            90..=119 => CookingTime::NinetyMinutes,
            _ => CookingTime::TwoHoursPlus,
        }
    }

    /// Label shown on recipe cards
    pub fn label(&self) -> &'static str {
        match self {
            CookingTime::ThirtyMinutes => "30 min",
            CookingTime::FortyFiveMinutes => "45 min",
            CookingTime::OneHour => "1 hr",
            CookingTime::NinetyMinutes => "1.5 hrs",
            CookingTime::TwoHoursPlus => "2+ hrs",
        }
    }
}

impl fmt::Display for CookingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A recipe with its derived badges, recomputed on every pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedRecipe {
    pub recipe: Recipe,
    pub is_vegetarian: bool,
    pub estimated_calories: u32,
    pub cooking_time: CookingTime,
}

impl fmt::Display for IngredientSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.measure {
            Some(measure) => write!(f, "{} {}", measure, self.ingredient),
            None => write!(f, "{}", self.ingredient),
        }
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.id, self.title)?;
        if let Some(area) = &self.area {
            write!(f, " ({})", area)?;
        }
        Ok(())
    }
}

impl fmt::Display for AnnotatedRecipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | ~{} kcal",
            self.recipe, self.cooking_time, self.estimated_calories
        )?;
        if self.is_vegetarian {
            write!(f, " | vegetarian")?;
        }
        Ok(())
    }
}
