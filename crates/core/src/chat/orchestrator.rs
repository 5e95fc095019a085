use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::Instrument;
use uuid::Uuid;

use super::fallback::{FallbackResponder, NoFallback};
use super::retrieval::{ContextRetriever, NoRetrieval};
use crate::commands::{CommandExecutor, Confirmation, classify, parse};
use crate::config::TrenerCfg;
use crate::planner::{NoPlanner, PlanGenerator};
use crate::types::{ChatRequest, ChatResponse, Command, Exercise, PlanRequest, TrainingPlan, TrainingRecord};

pub const CANCELLED: &str = "Anulowano.";
pub use crate::commands::executor::NOTHING_TO_CONFIRM;

/// Routes one chat message: confirmation gate, then command recognition,
/// then the generative fallback. Collaborator failures become
/// `success = false` responses; nothing here returns an error.
pub struct ChatService {
    executor: CommandExecutor,
    planner: Arc<dyn PlanGenerator>,
    responder: Arc<dyn FallbackResponder>,
    retriever: Arc<dyn ContextRetriever>,
    cfg: Arc<TrenerCfg>,
    timeout: Duration,
}

impl ChatService {
    pub fn new(executor: CommandExecutor, cfg: Arc<TrenerCfg>) -> Self {
        let timeout = Duration::from_secs(cfg.collaborator_timeout_secs.max(1));
        Self {
            executor,
            planner: Arc::new(NoPlanner),
            responder: Arc::new(NoFallback),
            retriever: Arc::new(NoRetrieval),
            cfg,
            timeout,
        }
    }

    pub fn with_planner(mut self, planner: Arc<dyn PlanGenerator>) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_responder(mut self, responder: Arc<dyn FallbackResponder>) -> Self {
        self.responder = responder;
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn ContextRetriever>) -> Self {
        self.retriever = retriever;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    pub async fn handle(&self, request: &ChatRequest) -> ChatResponse {
        let session_id = request.session_id();
        let span = tracing::info_span!("chat", session_id);
        self.route(request, session_id).instrument(span).await
    }

    async fn route(&self, request: &ChatRequest, session_id: &str) -> ChatResponse {
        match classify(&request.message) {
            Confirmation::Affirm => return self.confirm(session_id).await,
            Confirmation::Deny => {
                if self.executor.sessions().clear(session_id).is_some() {
                    tracing::info!("pending action cancelled");
                }
                return ChatResponse::text(true, CANCELLED);
            }
            Confirmation::Neither => {}
        }

        let parsed = parse(&request.message);
        if parsed.command() != Command::None {
            tracing::info!(command = %parsed.command(), "command parsed");
            let mut result = self.executor.execute(&parsed, session_id).await;
            if let Some(plan_request) = result.plan_request.take() {
                return self.generate_plan(plan_request).await;
            }
            return result.into();
        }

        self.fallback(request).await
    }

    async fn confirm(&self, session_id: &str) -> ChatResponse {
        self.executor.execute_pending(session_id).await.into()
    }

    async fn generate_plan(&self, request: PlanRequest) -> ChatResponse {
        let plan = match tokio::time::timeout(self.timeout, self.planner.generate(&request)).await {
            Ok(Ok(plan)) => plan,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "plan generation failed");
                return ChatResponse::text(false, format!("Błąd generowania planu: {e}"));
            }
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "plan generation timed out");
                return ChatResponse::text(
                    false,
                    format!("Błąd generowania planu: przekroczono limit czasu ({} s)", self.timeout.as_secs()),
                );
            }
        };

        let record = TrainingRecord {
            id: Uuid::new_v4(),
            difficulty: request.difficulty,
            mode: request.mode,
            participant_count: request.participant_count,
            plan: plan.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.executor.storage().record_training(&record).await {
            tracing::warn!(error = %e, "training history not recorded");
        }

        ChatResponse {
            response: render_plan(&plan, &request),
            command: Some(Command::CreateTraining.as_str().to_string()),
            data: Some(json!({ "plan": plan, "params": request })),
            needs_confirmation: false,
            success: true,
        }
    }

    async fn fallback(&self, request: &ChatRequest) -> ChatResponse {
        let limit = self.cfg.retrieval_top_k;
        let context = match tokio::time::timeout(self.timeout, self.retriever.retrieve(&request.message, limit)).await {
            Ok(Ok(context)) => context,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "context retrieval failed");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!("context retrieval timed out");
                Vec::new()
            }
        };
        tracing::debug!(snippets = context.len(), "answering with generative fallback");

        let answer = self.responder.answer(&request.message, &request.history, &context);
        match tokio::time::timeout(self.timeout, answer).await {
            Ok(Ok(text)) => ChatResponse::text(true, text),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "generative fallback failed");
                ChatResponse::text(false, format!("Błąd: {e}"))
            }
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "generative fallback timed out");
                ChatResponse::text(false, format!("Błąd: przekroczono limit czasu ({} s)", self.timeout.as_secs()))
            }
        }
    }
}

/// Markdown view of a generated plan.
pub fn render_plan(plan: &TrainingPlan, request: &PlanRequest) -> String {
    let mut out = format!(
        "**Plan treningowy wygenerowany!**\n\n\
         Trudność: **{}** · Tryb: **{}** · Uczestnicy: **{}** · Przerwa: **{} s**",
        request.difficulty.as_str(),
        plan.mode.as_str(),
        request.participant_count,
        request.rest_time_secs,
    );
    if let Some(minutes) = plan.total_duration_minutes.or(request.duration_minutes) {
        out.push_str(&format!(" · Czas: **{minutes} min**"));
    }
    out.push('\n');
    for (title, exercises) in [
        ("Rozgrzewka", &plan.warmup),
        ("Część główna", &plan.main_part),
        ("Wyciszenie", &plan.cooldown),
    ] {
        if exercises.is_empty() {
            continue;
        }
        out.push_str(&format!("\n### {title}\n"));
        for (i, exercise) in exercises.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, exercise_line(exercise)));
        }
    }
    out
}

fn exercise_line(exercise: &Exercise) -> String {
    if exercise.description.is_empty() {
        format!("**{}**", exercise.name)
    } else {
        format!("**{}** - {}", exercise.name, exercise.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Difficulty, TrainingMode};

    fn exercise(name: &str, description: &str) -> Exercise {
        Exercise {
            id: String::new(),
            name: name.into(),
            description: description.into(),
            muscle_group: "general".into(),
            difficulty: "easy".into(),
            kind: "main".into(),
        }
    }

    #[test]
    fn render_lists_non_empty_sections() {
        let plan = TrainingPlan {
            warmup: vec![exercise("Pajacyki", "")],
            main_part: vec![exercise("Pompki", "10 powtórzeń"), exercise("Przysiady", "15 powtórzeń")],
            cooldown: vec![],
            mode: TrainingMode::Common,
            total_duration_minutes: None,
        };
        let request = PlanRequest {
            difficulty: Difficulty::Easy,
            mode: TrainingMode::Common,
            participant_count: 2,
            rest_time_secs: 45,
            warmup_count: 1,
            main_count: 2,
            cooldown_count: 0,
            duration_minutes: Some(30),
            target_person_name: None,
        };
        let text = render_plan(&plan, &request);
        assert!(text.starts_with("**Plan treningowy wygenerowany!**"));
        assert!(text.contains("Czas: **30 min**"));
        assert!(text.contains("### Rozgrzewka\n1. **Pajacyki**\n"));
        assert!(text.contains("2. **Przysiady** - 15 powtórzeń"));
        assert!(!text.contains("Wyciszenie"));
    }
}
