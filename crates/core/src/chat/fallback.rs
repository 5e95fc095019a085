use std::sync::Arc;

use trener_llm::provider::{ChatMessage, CompletionRequest, LlmError, LlmProvider};

use crate::types::HistoryTurn;

#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    #[error("{0}")]
    Llm(#[from] LlmError),
    #[error("model nie jest skonfigurowany")]
    NotConfigured,
}

/// Free-form answer for messages no command recognized.
#[async_trait::async_trait]
pub trait FallbackResponder: Send + Sync {
    async fn answer(
        &self,
        message: &str,
        history: &[HistoryTurn],
        context: &[String],
    ) -> Result<String, FallbackError>;
}

/// Used when no model is configured; every call fails with a readable message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFallback;

#[async_trait::async_trait]
impl FallbackResponder for NoFallback {
    async fn answer(&self, _: &str, _: &[HistoryTurn], _: &[String]) -> Result<String, FallbackError> {
        Err(FallbackError::NotConfigured)
    }
}

const SYSTEM_PROMPT: &str = "Jesteś profesjonalnym asystentem trenera personalnego.

ZASADY:
- Odpowiadaj po polsku, zwięźle i konkretnie
- Używaj formatowania Markdown (nagłówki, listy, tabele)
- Bazuj przede wszystkim na informacjach z kontekstu poniżej
- Jeśli nie masz informacji, powiedz to wprost
- Podawaj konkretne liczby (serie, powtórzenia, kalorie)
- Ostrzegaj o przeciwwskazaniach gdy to istotne";

const NO_CONTEXT: &str = "(brak danych w bazie)";

/// Answers through an LLM with retrieved context in the system prompt.
pub struct LlmResponder {
    provider: Arc<dyn LlmProvider>,
    history_window: usize,
    max_tokens: u32,
    temperature: f32,
}

impl LlmResponder {
    pub fn new(provider: Arc<dyn LlmProvider>, history_window: usize) -> Self {
        Self { provider, history_window, max_tokens: 1024, temperature: 0.3 }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// System prompt, the last `history_window` turns, then the new message.
    pub fn build_messages(&self, message: &str, history: &[HistoryTurn], context: &[String]) -> Vec<ChatMessage> {
        let context_block = if context.is_empty() {
            NO_CONTEXT.to_string()
        } else {
            context.iter().map(|c| format!("- {c}")).collect::<Vec<_>>().join("\n")
        };
        let system = format!(
            "{SYSTEM_PROMPT}\n\nKONTEKST Z BAZY WIEDZY:\n{context_block}\n\n\
             Jeśli kontekst jest pusty, odpowiedz na podstawie ogólnej wiedzy o treningu."
        );

        let mut messages = vec![ChatMessage::system(system)];
        let start = history.len().saturating_sub(self.history_window);
        for turn in &history[start..] {
            messages.push(if turn.is_user() {
                ChatMessage::user(turn.content.clone())
            } else {
                ChatMessage::assistant(turn.content.clone())
            });
        }
        messages.push(ChatMessage::user(message));
        messages
    }
}

#[async_trait::async_trait]
impl FallbackResponder for LlmResponder {
    async fn answer(
        &self,
        message: &str,
        history: &[HistoryTurn],
        context: &[String],
    ) -> Result<String, FallbackError> {
        let request = CompletionRequest {
            messages: self.build_messages(message, history, context),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let response = self.provider.complete(request).await?;
        tracing::debug!(
            provider = self.provider.name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "fallback answered"
        );
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trener_llm::provider::{MockProvider, Role};

    fn turn(role: &str, content: &str) -> HistoryTurn {
        HistoryTurn { role: role.into(), content: content.into() }
    }

    #[test]
    fn messages_without_context_use_marker() {
        let responder = LlmResponder::new(Arc::new(MockProvider::new("x")), 6);
        let msgs = responder.build_messages("Ile serii?", &[], &[]);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::System);
        assert!(msgs[0].content.contains(NO_CONTEXT));
        assert_eq!(msgs[1].content, "Ile serii?");
    }

    #[test]
    fn history_is_windowed_and_roles_mapped() {
        let responder = LlmResponder::new(Arc::new(MockProvider::new("x")), 2);
        let history = vec![
            turn("user", "pierwsze"),
            turn("assistant", "odp1"),
            turn("user", "drugie"),
            turn("assistant", "odp2"),
        ];
        let msgs = responder.build_messages("trzecie", &history, &["Przysiady".into()]);
        assert_eq!(msgs.len(), 4);
        assert!(msgs[0].content.contains("- Przysiady"));
        assert!(!msgs[0].content.contains(NO_CONTEXT));
        assert_eq!((msgs[1].role, msgs[1].content.as_str()), (Role::User, "drugie"));
        assert_eq!((msgs[2].role, msgs[2].content.as_str()), (Role::Assistant, "odp2"));
        assert_eq!(msgs[3].content, "trzecie");
    }

    #[tokio::test]
    async fn answer_returns_completion_verbatim() {
        let provider = Arc::new(MockProvider::new("**Odpowiedź** z modelu"));
        let responder = LlmResponder::new(provider.clone(), 6).with_sampling(256, 0.1);
        let text = responder.answer("pytanie", &[], &[]).await.unwrap();
        assert_eq!(text, "**Odpowiedź** z modelu");
        let sent = provider.last_request().unwrap();
        assert_eq!(sent.max_tokens, 256);
    }

    #[tokio::test]
    async fn provider_failure_is_reported() {
        let responder = LlmResponder::new(Arc::new(MockProvider::failing("boom")), 6);
        let err = responder.answer("pytanie", &[], &[]).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(matches!(NoFallback.answer("x", &[], &[]).await, Err(FallbackError::NotConfigured)));
    }
}
