//! Scripted transport for tests and offline runs.
//!
//! Replies are registered per URL. Every request is recorded, including the
//! ones that end in a scripted failure, so tests can assert on call order.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use super::connection::ApiConnectionError;
use super::transport::{HttpReply, JsonPost, JsonTransport};

#[derive(Debug, Clone)]
pub enum FakeReply {
    Reply(HttpReply),
    Timeout,
    Unreachable(String),
}

impl FakeReply {
    pub fn json(status: u16, body: Value) -> Self {
        FakeReply::Reply(HttpReply {
            status,
            body: body.to_string(),
        })
    }

    pub fn text(status: u16, body: &str) -> Self {
        FakeReply::Reply(HttpReply {
            status,
            body: body.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub body: Value,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Default)]
pub struct FakeTransport {
    replies: Mutex<HashMap<String, FakeReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the reply for `url`, replacing any earlier one.
    pub fn respond(&self, url: &str, reply: FakeReply) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.url).collect()
    }
}

#[async_trait]
impl JsonTransport for FakeTransport {
    async fn post_json(&self, request: JsonPost<'_>) -> Result<HttpReply, ApiConnectionError> {
        self.calls.lock().unwrap().push(RecordedCall {
            url: request.url.to_string(),
            body: request.body.clone(),
            bearer_token: request.bearer_token.map(str::to_string),
        });

        let reply = self.replies.lock().unwrap().get(request.url).cloned();
        match reply {
            Some(FakeReply::Reply(reply)) => Ok(reply),
            Some(FakeReply::Timeout) => Err(ApiConnectionError::Timeout {
                url: request.url.to_string(),
                timeout_ms: request.timeout.as_millis(),
            }),
            Some(FakeReply::Unreachable(reason)) => Err(ApiConnectionError::Unreachable(reason)),
            None => Err(ApiConnectionError::Unreachable(format!(
                "no fake reply registered for {}",
                request.url
            ))),
        }
    }
}
