//! Locally owned set of favorite recipe ids.

use serde::{Deserialize, Serialize};

/// Favorite recipe ids in the order they were added
///
/// Serialized as a plain JSON array of ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FavoriteSet {
    ids: Vec<String>,
}

impl FavoriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from ids, dropping duplicates and keeping first occurrences
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = FavoriteSet::new();
        for id in ids {
            let id = id.into();
            if !set.contains(&id) {
                set.ids.push(id);
            }
        }
        set
    }

    pub fn contains(&self, recipe_id: &str) -> bool {
        self.ids.iter().any(|id| id == recipe_id)
    }

    /// Flip membership of `recipe_id`, returning the new membership
    pub fn toggle(&mut self, recipe_id: &str) -> bool {
        if let Some(pos) = self.ids.iter().position(|id| id == recipe_id) {
            self.ids.remove(pos);
            false
        } else {
            self.ids.push(recipe_id.to_string());
            true
        }
    }

    /// Copy of this set with `recipe_id` toggled, plus the new membership
    pub fn toggled(&self, recipe_id: &str) -> (Self, bool) {
        let mut next = self.clone();
        let favorited = next.toggle(recipe_id);
        (next, favorited)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
