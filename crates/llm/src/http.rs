//! HTTP completion client for the trainer assistant.
//!
//! Two wire dialects: Anthropic's Messages API for `claude-*` models and the
//! OpenAI chat completions format for everything else (OpenAI, Gemini's and
//! DeepSeek's compatible endpoints, local gateways).

use crate::provider::{CompletionRequest, CompletionResponse, LlmError, LlmProvider, Role};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    OpenAiCompatible,
    Anthropic,
}

impl Dialect {
    pub fn for_model(model: &str) -> Self {
        if model.to_lowercase().starts_with("claude-") {
            Self::Anthropic
        } else {
            Self::OpenAiCompatible
        }
    }

    /// Default base URL. Gemini and DeepSeek keys get their vendor's
    /// compatible endpoint, anything unknown goes to OpenAI.
    fn default_base_url(self, model: &str) -> &'static str {
        let m = model.to_lowercase();
        match self {
            Self::Anthropic => "https://api.anthropic.com",
            Self::OpenAiCompatible if m.starts_with("gemini-") => {
                "https://generativelanguage.googleapis.com/v1beta/openai"
            }
            Self::OpenAiCompatible if m.starts_with("deepseek-") => "https://api.deepseek.com",
            Self::OpenAiCompatible => "https://api.openai.com/v1",
        }
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionReply {
    choices: Vec<Choice>,
    usage: Option<ChatCompletionUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletionUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct MessagesReply {
    content: Vec<ContentBlock>,
    usage: Option<MessagesUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Completion provider over HTTP.
pub struct HttpProvider {
    dialect: Dialect,
    model: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpProvider {
    pub fn new(model: String, api_key: String, base_url: Option<String>) -> Self {
        let dialect = Dialect::for_model(&model);
        let base = base_url.unwrap_or_else(|| dialect.default_base_url(&model).to_owned());
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "http client builder failed, using defaults");
                reqwest::Client::new()
            });
        Self {
            dialect,
            model,
            client,
            base_url: base.trim_end_matches('/').to_owned(),
            api_key,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        match self.dialect {
            Dialect::Anthropic => format!("{}/v1/messages", self.base_url),
            Dialect::OpenAiCompatible => format!("{}/chat/completions", self.base_url),
        }
    }

    /// POST `body`, map non-success statuses, decode the reply.
    async fn post<B: Serialize, R: DeserializeOwned>(&self, body: &B) -> Result<R, LlmError> {
        let builder = self.client.post(self.endpoint()).json(body);
        let builder = match self.dialect {
            Dialect::Anthropic => builder
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            Dialect::OpenAiCompatible => builder.bearer_auth(&self.api_key),
        };

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                LlmError::Unavailable(e.to_string())
            } else {
                LlmError::RequestFailed(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(status_error(status, text));
        }
        resp.json().await.map_err(|e| LlmError::RequestFailed(e.to_string()))
    }

    async fn chat_completion(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage { role: m.role.as_str(), content: &m.content })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        let reply: ChatCompletionReply = self.post(&body).await?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let (input_tokens, output_tokens) = reply
            .usage
            .map_or((0, 0), |u| (u.prompt_tokens, u.completion_tokens));
        tracing::debug!(model = %self.model, input_tokens, output_tokens, "completion done");
        Ok(CompletionResponse { content, input_tokens, output_tokens })
    }

    async fn messages(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        // System turns go into the top-level `system` field.
        let system = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>();
        let body = MessagesBody {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: request
                .messages
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| WireMessage { role: m.role.as_str(), content: &m.content })
                .collect(),
            temperature: request.temperature,
        };
        let reply: MessagesReply = self.post(&body).await?;

        let content = join_text(reply.content);
        let (input_tokens, output_tokens) = reply
            .usage
            .map_or((0, 0), |u| (u.input_tokens, u.output_tokens));
        tracing::debug!(model = %self.model, input_tokens, output_tokens, "completion done");
        Ok(CompletionResponse { content, input_tokens, output_tokens })
    }
}

fn join_text(blocks: Vec<ContentBlock>) -> String {
    blocks
        .into_iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
        .collect()
}

/// 429 is `RateLimited`, 5xx is `Unavailable`, the rest carry the body.
fn status_error(status: reqwest::StatusCode, body: String) -> LlmError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        LlmError::RateLimited
    } else if status.is_server_error() {
        LlmError::Unavailable(status.to_string())
    } else {
        LlmError::RequestFailed(format!("{status}: {body}"))
    }
}

impl LlmProvider for HttpProvider {
    fn name(&self) -> &str {
        match self.dialect {
            Dialect::Anthropic => "anthropic",
            Dialect::OpenAiCompatible => "openai-compatible",
        }
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        match self.dialect {
            Dialect::Anthropic => Box::pin(self.messages(request)),
            Dialect::OpenAiCompatible => Box::pin(self.chat_completion(request)),
        }
    }
}

/// Provider from `TRENER_LLM_MODEL`, `TRENER_LLM_API_KEY` and the optional
/// `TRENER_LLM_BASE_URL`. `None` when model or key is missing.
pub fn from_env() -> Option<HttpProvider> {
    let model = std::env::var("TRENER_LLM_MODEL").ok().filter(|m| !m.trim().is_empty())?;
    let api_key = std::env::var("TRENER_LLM_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url = std::env::var("TRENER_LLM_BASE_URL").ok();
    Some(HttpProvider::new(model, api_key, base_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_follows_model_prefix() {
        assert_eq!(Dialect::for_model("Claude-3-opus"), Dialect::Anthropic);
        assert_eq!(Dialect::for_model("gpt-4o"), Dialect::OpenAiCompatible);
        assert_eq!(Dialect::for_model("gemini-2.0-flash"), Dialect::OpenAiCompatible);
    }

    #[test]
    fn vendor_endpoints() {
        let gpt = HttpProvider::new("gpt-4o-mini".into(), "k".into(), None);
        assert_eq!(gpt.endpoint(), "https://api.openai.com/v1/chat/completions");

        let claude = HttpProvider::new("claude-sonnet-4-5".into(), "k".into(), None);
        assert_eq!(claude.endpoint(), "https://api.anthropic.com/v1/messages");
        assert_eq!(claude.name(), "anthropic");

        let deepseek = HttpProvider::new("deepseek-chat".into(), "k".into(), None);
        assert_eq!(deepseek.endpoint(), "https://api.deepseek.com/chat/completions");
    }

    #[test]
    fn base_url_override_drops_trailing_slash() {
        let p = HttpProvider::new("llama-3".into(), "k".into(), Some("http://localhost:11434/v1/".into()));
        assert_eq!(p.endpoint(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(p.name(), "openai-compatible");
    }

    #[test]
    fn statuses_map_to_errors() {
        assert!(matches!(
            status_error(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()),
            LlmError::RateLimited
        ));
        assert!(matches!(
            status_error(reqwest::StatusCode::BAD_GATEWAY, String::new()),
            LlmError::Unavailable(_)
        ));
        let err = status_error(reqwest::StatusCode::BAD_REQUEST, "bad model".into());
        assert!(err.to_string().contains("bad model"));
    }

    #[test]
    fn messages_reply_keeps_only_text() {
        let raw = r#"{"content":[{"type":"text","text":"Przysiad "},{"type":"thinking","thinking":"x"},{"type":"text","text":"ze sztangą"}],"usage":{"input_tokens":1,"output_tokens":2}}"#;
        let reply: MessagesReply = serde_json::from_str(raw).unwrap();
        assert_eq!(join_text(reply.content), "Przysiad ze sztangą");
    }
}
