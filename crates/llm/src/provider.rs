use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// LLM completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// LLM completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Error type for LLM operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("rate limited")]
    RateLimited,
    #[error("request failed: {0}")]
    RequestFailed(String),
}

/// Trait for LLM providers (OpenAI-compatible endpoints, Anthropic).
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>>;
}

/// Mock provider for testing. Returns a fixed response (or a fixed failure)
/// and remembers the last request it was given.
#[derive(Debug)]
pub struct MockProvider {
    response: Result<String, String>,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl MockProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: Ok(response.into()),
            last_request: Mutex::new(None),
        }
    }

    /// A mock whose every call fails with `RequestFailed(reason)`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            response: Err(reason.into()),
            last_request: Mutex::new(None),
        }
    }

    /// The most recent request seen by this mock.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        *self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(request);
        let response = self.response.clone();
        Box::pin(async move {
            match response {
                Ok(content) => Ok(CompletionResponse {
                    content,
                    input_tokens: 10,
                    output_tokens: 20,
                }),
                Err(reason) => Err(LlmError::RequestFailed(reason)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::user(text)],
            max_tokens: 100,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn mock_provider_returns_response() {
        let mock = MockProvider::new("cześć");
        let resp = mock.complete(request("hej")).await.unwrap();
        assert_eq!(resp.content, "cześć");
    }

    #[tokio::test]
    async fn mock_provider_records_last_request() {
        let mock = MockProvider::new("ok");
        assert!(mock.last_request().is_none());
        mock.complete(request("pierwsze")).await.unwrap();
        mock.complete(request("drugie")).await.unwrap();
        let last = mock.last_request().unwrap();
        assert_eq!(last.messages[0].content, "drugie");
    }

    #[tokio::test]
    async fn failing_mock_returns_error() {
        let mock = MockProvider::failing("boom");
        let err = mock.complete(request("hej")).await.unwrap_err();
        assert_eq!(err.to_string(), "request failed: boom");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("x")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
    }
}
