//! Taste preferences inferred from chat, conversation state and the
//! recommendation heuristics used when the AI endpoint is unavailable.

pub mod engine;
pub mod inference;
pub mod recommend;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use engine::{AssistantSession, MAX_HISTORY, PREFERENCES_KEY};
pub use inference::analyze;
pub use recommend::{confidence, extract_recommendations, generate_fallback, validate_ai_response};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpicyLevel {
    None,
    Mild,
    Medium,
    High,
}

impl fmt::Display for SpicyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SpicyLevel::None => "none",
            SpicyLevel::Mild => "mild",
            SpicyLevel::Medium => "medium",
            SpicyLevel::High => "high",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Accumulated preferences. Every field is optional; `merge` overwrites
/// field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spicy_level: Option<SpicyLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuisine_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dietary_restrictions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite_ingredients: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooking_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
}

impl UserPreferences {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn merge(&mut self, update: UserPreferences) {
        if update.spicy_level.is_some() {
            self.spicy_level = update.spicy_level;
        }
        if update.cuisine_type.is_some() {
            self.cuisine_type = update.cuisine_type;
        }
        if update.dietary_restrictions.is_some() {
            self.dietary_restrictions = update.dietary_restrictions;
        }
        if update.favorite_ingredients.is_some() {
            self.favorite_ingredients = update.favorite_ingredients;
        }
        if update.cooking_time.is_some() {
            self.cooking_time = update.cooking_time;
        }
        if update.difficulty.is_some() {
            self.difficulty = update.difficulty;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker label used in prompts.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "用户",
            Role::Assistant => "助手",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AIResponse {
    pub message: String,
    pub recommendations: Vec<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuisine_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooking_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
}
