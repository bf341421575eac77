//! Push notification preferences stored per device and mirrored per user.

use serde::{Deserialize, Serialize};

/// Which push notifications the user wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotificationSettings {
    pub new_recipes: bool,
    pub cooking_timers: bool,
    pub favorite_updates: bool,
}

impl Default for PushNotificationSettings {
    fn default() -> Self {
        Self {
            new_recipes: true,
            cooking_timers: true,
            favorite_updates: true,
        }
    }
}

/// Partial update; `None` fields keep their current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub new_recipes: Option<bool>,
    pub cooking_timers: Option<bool>,
    pub favorite_updates: Option<bool>,
}

impl PushNotificationSettings {
    /// Apply a partial update, returning the merged settings
    pub fn merged(self, patch: SettingsPatch) -> Self {
        Self {
            new_recipes: patch.new_recipes.unwrap_or(self.new_recipes),
            cooking_timers: patch.cooking_timers.unwrap_or(self.cooking_timers),
            favorite_updates: patch.favorite_updates.unwrap_or(self.favorite_updates),
        }
    }
}
