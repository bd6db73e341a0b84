use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;

use super::inference::analyze;
use super::recommend::{
    extract_recommendations, generate_fallback, AI_REPLY_CONFIDENCE, EMPTY_REPLY_MESSAGE,
};
use super::{AIResponse, ConversationTurn, Role, UserPreferences};
use crate::api_connection::endpoints::{ChatCompletionRequest, ChatMessage};
use crate::api_connection::{ApiConnectionError, ChatProvider};
use crate::storage::kv::{load_json, save_json};
use crate::storage::KeyValueStore;

pub const PREFERENCES_KEY: &str = "aiAssistantPreferences";
pub const MAX_HISTORY: usize = 50;
const CONTEXT_TURNS: usize = 3;

pub const SYSTEM_PROMPT: &str =
    "你是一个专业的美食助手，根据用户的口味偏好推荐合适的菜品。请用中文回答。";
const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Ai,
    Heuristic,
}

/// The AI endpoint is asked first; the preference table answers when it fails.
const RECOMMENDATION_ORDER: [Strategy; 2] = [Strategy::Ai, Strategy::Heuristic];

/// One chat session: its history, the preferences learned so far, and the
/// handles it needs to persist them and reach the AI endpoint.
pub struct AssistantSession {
    provider: ChatProvider,
    store: Arc<dyn KeyValueStore>,
    preferences: UserPreferences,
    history: VecDeque<ConversationTurn>,
}

impl AssistantSession {
    pub fn new(provider: ChatProvider, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            provider,
            store,
            preferences: UserPreferences::default(),
            history: VecDeque::with_capacity(MAX_HISTORY),
        }
    }

    /// New session with the persisted preferences already loaded.
    pub fn restore(provider: ChatProvider, store: Arc<dyn KeyValueStore>) -> Self {
        let mut session = Self::new(provider, store);
        session.load_preferences();
        session
    }

    pub fn preferences(&self) -> &UserPreferences {
        &self.preferences
    }

    pub fn history(&self) -> &VecDeque<ConversationTurn> {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn load_preferences(&mut self) {
        match load_json::<UserPreferences>(self.store.as_ref(), PREFERENCES_KEY) {
            Ok(prefs) => self.preferences = prefs,
            Err(e) => {
                tracing::warn!(error = %e, "could not load saved preferences");
                self.preferences = UserPreferences::default();
            }
        }
    }

    /// Merges `update` and persists the result. A failed save is logged; the
    /// merged preferences stay in effect either way.
    pub fn set_preferences(&mut self, update: UserPreferences) {
        self.preferences.merge(update);
        if let Err(e) = save_json(self.store.as_ref(), PREFERENCES_KEY, &self.preferences) {
            tracing::warn!(error = %e, "could not save preferences");
        }
    }

    /// Folds whatever `message` reveals into the preferences.
    pub fn learn_from(&mut self, message: &str) -> UserPreferences {
        let inferred = analyze(message);
        if !inferred.is_empty() {
            tracing::debug!(?inferred, "learned preferences from message");
            self.set_preferences(inferred.clone());
        }
        inferred
    }

    pub async fn send_message(&mut self, text: &str) -> AIResponse {
        self.learn_from(text);
        self.push_turn(Role::User, text);

        let response = self.recommend(text).await;

        self.push_turn(Role::Assistant, &response.message);
        response
    }

    /// Recommendations from preferences and recent turns. History is untouched.
    pub async fn smart_recommendations(&self) -> AIResponse {
        let context = self.build_context();
        self.recommend(&context).await
    }

    pub fn build_context(&self) -> String {
        let mut context = String::from("根据以下信息推荐菜品：\n");

        if let Some(level) = self.preferences.spicy_level {
            let _ = writeln!(context, "- 辣度偏好：{}", level);
        }
        if let Some(cuisine) = &self.preferences.cuisine_type {
            let _ = writeln!(context, "- 菜系偏好：{}", cuisine);
        }
        if let Some(ingredients) = &self.preferences.favorite_ingredients {
            let _ = writeln!(context, "- 喜欢的食材：{}", ingredients.join("、"));
        }

        if !self.history.is_empty() {
            context.push_str("\n最近的对话：\n");
            let skip = self.history.len().saturating_sub(CONTEXT_TURNS);
            for turn in self.history.iter().skip(skip) {
                let _ = writeln!(context, "{}: {}", turn.role.label(), turn.content);
            }
        }

        context.push_str("\n请推荐3个合适的菜品，并说明推荐理由。");
        context
    }

    fn push_turn(&mut self, role: Role, content: &str) {
        self.history.push_back(ConversationTurn::new(role, content));
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
    }

    async fn recommend(&self, prompt: &str) -> AIResponse {
        for strategy in RECOMMENDATION_ORDER {
            match self.attempt(strategy, prompt).await {
                Ok(response) => {
                    tracing::info!(?strategy, recommendations = response.recommendations.len(), "recommendation ready");
                    return response;
                }
                Err(e) => tracing::warn!(?strategy, error = %e, "recommendation strategy failed"),
            }
        }
        generate_fallback(&self.preferences)
    }

    async fn attempt(&self, strategy: Strategy, prompt: &str) -> Result<AIResponse, ApiConnectionError> {
        match strategy {
            Strategy::Ai => self.ask(prompt).await,
            Strategy::Heuristic => Ok(generate_fallback(&self.preferences)),
        }
    }

    async fn ask(&self, prompt: &str) -> Result<AIResponse, ApiConnectionError> {
        let request = ChatCompletionRequest {
            model: self.provider.model().to_string(),
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)],
            temperature: Some(TEMPERATURE),
            max_tokens: Some(MAX_TOKENS),
        };
        let response = self.provider.call_chat_completion(request).await?;
        let message = response
            .first_content()
            .unwrap_or(EMPTY_REPLY_MESSAGE)
            .to_string();

        Ok(AIResponse {
            recommendations: extract_recommendations(&message),
            message,
            confidence: AI_REPLY_CONFIDENCE,
            cuisine_type: None,
            cooking_time: None,
            difficulty: None,
        })
    }
}
