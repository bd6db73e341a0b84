use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::api_connection::endpoints::DEFAULT_RECIPE_WEBHOOK_URL;
use crate::api_connection::{
    ApiConnectionError, EndpointResolver, JsonPost, JsonTransport, Resolution,
};

pub const DEFAULT_CUISINE: &str = "不限";
pub const DEFAULT_DIFFICULTY: &str = "简单";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeGenerationRequest {
    pub ingredients: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuisine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Body actually posted to the webhook, with defaults filled in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeWebhookPayload {
    pub ingredients: Vec<String>,
    pub cuisine: String,
    pub difficulty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub timestamp: String,
}

impl RecipeWebhookPayload {
    pub fn from_request(request: &RecipeGenerationRequest) -> Self {
        Self {
            ingredients: request.ingredients.clone(),
            cuisine: non_blank(&request.cuisine).unwrap_or(DEFAULT_CUISINE).to_string(),
            difficulty: non_blank(&request.difficulty)
                .unwrap_or(DEFAULT_DIFFICULTY)
                .to_string(),
            user_id: request.user_id.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub name: String,
    #[serde(default)]
    pub cuisine: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub cooking_time: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tips: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeGenerationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe: Option<Recipe>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecipeGenerationResponse {
    pub fn ok(recipe: Recipe) -> Self {
        Self {
            success: true,
            recipe: Some(recipe),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            recipe: None,
            error: Some(error.into()),
        }
    }
}

/// Pulls the `recipe` object out of a webhook body, checking its shape first.
pub fn extract_recipe(body: &Value) -> Result<Recipe, ApiConnectionError> {
    let recipe = body
        .get("recipe")
        .filter(|v| v.is_object())
        .ok_or_else(|| ApiConnectionError::UnexpectedShape("response has no recipe object".to_string()))?;
    let recipe: Recipe = serde_json::from_value(recipe.clone())?;
    if recipe.name.trim().is_empty() {
        return Err(ApiConnectionError::UnexpectedShape(
            "recipe has an empty name".to_string(),
        ));
    }
    Ok(recipe)
}

pub struct RecipeClient {
    transport: Arc<dyn JsonTransport>,
    endpoint: String,
    timeout: Duration,
}

impl RecipeClient {
    pub fn new(transport: Arc<dyn JsonTransport>) -> Self {
        Self {
            transport,
            endpoint: DEFAULT_RECIPE_WEBHOOK_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts to the configured webhook. Every failure comes back as `success: false`.
    pub async fn generate(&self, request: &RecipeGenerationRequest) -> RecipeGenerationResponse {
        match self.try_generate(request).await {
            Ok(recipe) => {
                tracing::info!(recipe = %recipe.name, "recipe generated");
                RecipeGenerationResponse::ok(recipe)
            }
            Err(e) => {
                tracing::error!(endpoint = %self.endpoint, error = %e, "recipe generation failed");
                RecipeGenerationResponse::failed(e.to_string())
            }
        }
    }

    async fn try_generate(
        &self,
        request: &RecipeGenerationRequest,
    ) -> Result<Recipe, ApiConnectionError> {
        let payload = serde_json::to_value(RecipeWebhookPayload::from_request(request))?;
        tracing::debug!(payload = %payload, "sending recipe request");
        let reply = self
            .transport
            .post_json(JsonPost::new(&self.endpoint, &payload, self.timeout))
            .await?
            .error_for_status()?;
        extract_recipe(&reply.json::<Value>()?)
    }

    /// Diagnostic mode: scans `candidates` in order and uses the first that answers.
    /// Returns the winning URL alongside the response.
    pub async fn generate_with_probe<S: AsRef<str>>(
        &self,
        request: &RecipeGenerationRequest,
        candidates: &[S],
    ) -> (Option<String>, RecipeGenerationResponse) {
        let payload = match serde_json::to_value(RecipeWebhookPayload::from_request(request)) {
            Ok(payload) => payload,
            Err(e) => return (None, RecipeGenerationResponse::failed(e.to_string())),
        };

        let resolution = EndpointResolver::new(self.transport.as_ref())
            .with_attempt_timeout(self.timeout)
            .resolve(candidates, &payload)
            .await;

        match resolution {
            Resolution::Resolved { url, data } => {
                let response = match extract_recipe(&data) {
                    Ok(recipe) => RecipeGenerationResponse::ok(recipe),
                    Err(e) => RecipeGenerationResponse::failed(e.to_string()),
                };
                (Some(url), response)
            }
            Resolution::Exhausted { failures } => {
                let summary = failures
                    .iter()
                    .map(|f| format!("{}: {}", f.url, f.error))
                    .collect::<Vec<_>>()
                    .join("; ");
                (
                    None,
                    RecipeGenerationResponse::failed(format!(
                        "no recipe endpoint answered ({})",
                        summary
                    )),
                )
            }
        }
    }
}
