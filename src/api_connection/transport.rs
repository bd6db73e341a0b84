use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use super::connection::ApiConnectionError;

/// One JSON POST. The timeout bounds this single attempt only.
#[derive(Debug, Clone, Copy)]
pub struct JsonPost<'a> {
    pub url: &'a str,
    pub body: &'a Value,
    pub timeout: Duration,
    pub bearer_token: Option<&'a str>,
}

impl<'a> JsonPost<'a> {
    pub fn new(url: &'a str, body: &'a Value, timeout: Duration) -> Self {
        Self {
            url,
            body,
            timeout,
            bearer_token: None,
        }
    }

    pub fn bearer(mut self, token: &'a str) -> Self {
        self.bearer_token = Some(token);
        self
    }
}

/// Raw outcome of a request that reached the server.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiConnectionError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Turns a non-2xx reply into an `ApiError`, passing 2xx through.
    pub fn error_for_status(self) -> Result<Self, ApiConnectionError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiConnectionError::ApiError {
                status: self.status,
                error_body: self.body,
            })
        }
    }
}

/// Network seam for every outgoing JSON call, so tests can script replies.
#[async_trait]
pub trait JsonTransport: Send + Sync {
    async fn post_json(&self, request: JsonPost<'_>) -> Result<HttpReply, ApiConnectionError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, ApiConnectionError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JsonTransport for HttpTransport {
    async fn post_json(&self, request: JsonPost<'_>) -> Result<HttpReply, ApiConnectionError> {
        let mut builder = self
            .client
            .post(request.url)
            .timeout(request.timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(request.body);
        if let Some(token) = request.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiConnectionError::Timeout {
                    url: request.url.to_string(),
                    timeout_ms: request.timeout.as_millis(),
                }
            } else if e.is_connect() {
                ApiConnectionError::Unreachable(format!("{}: {}", request.url, e))
            } else {
                ApiConnectionError::NetworkError(e)
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_status_ranges() {
        let ok = HttpReply {
            status: 204,
            body: String::new(),
        };
        assert!(ok.is_success());
        let redirect = HttpReply {
            status: 302,
            body: String::new(),
        };
        assert!(!redirect.is_success());
    }

    #[test]
    fn test_error_for_status_keeps_body() {
        let reply = HttpReply {
            status: 500,
            body: "workflow crashed".to_string(),
        };
        match reply.error_for_status() {
            Err(ApiConnectionError::ApiError { status, error_body }) => {
                assert_eq!(status, 500);
                assert_eq!(error_body, "workflow crashed");
            }
            other => panic!("expected ApiError, got {:?}", other),
        }
    }

    #[test]
    fn test_json_rejects_html_body() {
        let reply = HttpReply {
            status: 200,
            body: "<html>ok</html>".to_string(),
        };
        assert!(matches!(
            reply.json::<Value>(),
            Err(ApiConnectionError::SerializationError(_))
        ));
    }
}
