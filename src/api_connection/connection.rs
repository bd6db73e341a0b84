use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::endpoints::{
    chat_completions_url, ChatCompletionRequest, ChatCompletionResponse, DEFAULT_AI_BASE_URL,
    DEFAULT_AI_MODEL,
};
use super::transport::{JsonPost, JsonTransport};

#[derive(Debug, Error)]
pub enum ApiConnectionError {
    #[error("API key not found in environment: {0}")]
    MissingApiKey(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u128 },
    #[error("Connection failed: {0}")]
    Unreachable(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("HTTP error {status}: {error_body}")]
    ApiError { status: u16, error_body: String },
    #[error("Unexpected response shape: {0}")]
    UnexpectedShape(String),
}

/// Chat-completion endpoint (OpenAI-compatible) behind a `JsonTransport`.
#[derive(Clone)]
pub struct ChatProvider {
    transport: Arc<dyn JsonTransport>,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl ChatProvider {
    pub fn new(transport: Arc<dyn JsonTransport>, api_key: Option<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_AI_BASE_URL.to_string(),
            api_key,
            model: DEFAULT_AI_MODEL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> String {
        chat_completions_url(&self.base_url)
    }

    pub async fn call_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ApiConnectionError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ApiConnectionError::MissingApiKey("AI_API_KEY".to_string()))?;

        let url = self.endpoint();
        let payload: Value = serde_json::to_value(&request)?;
        tracing::debug!(url = %url, model = %request.model, "calling chat completion");

        let reply = self
            .transport
            .post_json(JsonPost::new(&url, &payload, self.timeout).bearer(api_key))
            .await?
            .error_for_status()?;

        let response: ChatCompletionResponse = reply.json()?;
        if response.choices.is_empty() {
            return Err(ApiConnectionError::UnexpectedShape(
                "no choices in chat completion response".to_string(),
            ));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::endpoints::ChatMessage;
    use crate::api_connection::fake::{FakeReply, FakeTransport};
    use serde_json::json;

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: DEFAULT_AI_MODEL.to_string(),
            messages: vec![ChatMessage::user("推荐一道菜")],
            temperature: Some(0.7),
            max_tokens: Some(500),
        }
    }

    #[tokio::test]
    async fn test_missing_api_key_error() {
        let transport = Arc::new(FakeTransport::new());
        let provider = ChatProvider::new(transport.clone(), None);
        let result = provider.call_chat_completion(request()).await;
        assert!(matches!(result, Err(ApiConnectionError::MissingApiKey(_))));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_successful_call_sends_bearer_and_payload() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(
            "https://ai.test/chat/completions",
            FakeReply::json(200, json!({"choices": [{"message": {"role": "assistant", "content": " 水煮鱼 "}}]})),
        );
        let provider = ChatProvider::new(transport.clone(), Some("sk-test".to_string()))
            .with_base_url("https://ai.test/");

        let response = provider.call_chat_completion(request()).await.unwrap();
        assert_eq!(response.first_content(), Some("水煮鱼"));

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].bearer_token.as_deref(), Some("sk-test"));
        assert_eq!(calls[0].body["model"], "deepseek-chat");
        assert_eq!(calls[0].body["max_tokens"], 500);
    }

    #[tokio::test]
    async fn test_non_success_status_is_api_error() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(
            "https://ai.test/chat/completions",
            FakeReply::text(401, "invalid key"),
        );
        let provider =
            ChatProvider::new(transport, Some("bad".to_string())).with_base_url("https://ai.test");

        let result = provider.call_chat_completion(request()).await;
        assert!(matches!(
            result,
            Err(ApiConnectionError::ApiError { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_choices_is_unexpected_shape() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(
            "https://ai.test/chat/completions",
            FakeReply::json(200, json!({"choices": []})),
        );
        let provider =
            ChatProvider::new(transport, Some("k".to_string())).with_base_url("https://ai.test");

        let result = provider.call_chat_completion(request()).await;
        assert!(matches!(result, Err(ApiConnectionError::UnexpectedShape(_))));
    }
}
