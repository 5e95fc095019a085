use std::sync::Arc;

use trener_llm::provider::{ChatMessage, CompletionRequest, LlmError, LlmProvider};

use crate::chat::retrieval::ContextRetriever;
use crate::config::TrenerCfg;
use crate::types::{Difficulty, PlanRequest, TrainingMode, TrainingParams, TrainingPlan};

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("{0}")]
    Llm(#[from] LlmError),
    #[error("model zwrócił niepoprawny plan: {0}")]
    Malformed(String),
    #[error("generator planów nie jest skonfigurowany")]
    NotConfigured,
}

/// Produces a structured training plan. May be slow and may fail.
#[async_trait::async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate(&self, request: &PlanRequest) -> Result<TrainingPlan, PlanError>;
}

/// Fill unspecified training parameters from config.
/// Participant count is clamped to `1..=plan_max_participants`.
pub fn plan_request(params: &TrainingParams, cfg: &TrenerCfg) -> PlanRequest {
    let max = cfg.plan_max_participants.max(1);
    PlanRequest {
        difficulty: params.difficulty.unwrap_or(Difficulty::Medium),
        mode: params.mode.unwrap_or(TrainingMode::Circuit),
        participant_count: params.participant_count.unwrap_or(1).clamp(1, max),
        rest_time_secs: cfg.plan_rest_time_secs,
        warmup_count: cfg.plan_warmup_count,
        main_count: cfg.plan_main_count,
        cooldown_count: cfg.plan_cooldown_count,
        duration_minutes: params.duration_minutes,
        target_person_name: params.target_person_name.clone(),
    }
}

/// Used when no model is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPlanner;

#[async_trait::async_trait]
impl PlanGenerator for NoPlanner {
    async fn generate(&self, _: &PlanRequest) -> Result<TrainingPlan, PlanError> {
        Err(PlanError::NotConfigured)
    }
}

const PLAN_SYSTEM_PROMPT: &str = "You are a professional personal trainer. Build a training plan \
    from the exercise candidates provided by the user message when there are any. \
    Reply with a single JSON object and nothing else, shaped as: \
    {\"warmup\":[Exercise],\"main_part\":[Exercise],\"cooldown\":[Exercise],\"mode\":\"circuit\"|\"common\",\"total_duration_minutes\":int} \
    where Exercise is {\"id\":str,\"name\":str,\"description\":str,\"muscle_group\":str,\"difficulty\":\"easy\"|\"medium\"|\"hard\",\"type\":\"warmup\"|\"main\"|\"cooldown\"}. \
    Exercise names and descriptions in Polish.";

/// Asks an LLM for a JSON plan, using retrieved exercise descriptions as candidates.
pub struct LlmPlanGenerator {
    provider: Arc<dyn LlmProvider>,
    retriever: Arc<dyn ContextRetriever>,
    candidates: usize,
    max_tokens: u32,
    temperature: f32,
}

impl LlmPlanGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, retriever: Arc<dyn ContextRetriever>) -> Self {
        Self { provider, retriever, candidates: 15, max_tokens: 2048, temperature: 0.3 }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    fn user_prompt(request: &PlanRequest, candidates: &[String]) -> String {
        let mode_desc = match request.mode {
            TrainingMode::Circuit => "circuit stations, each participant does a different exercise",
            TrainingMode::Common => "everyone does the same exercise",
        };
        let mut prompt = format!(
            "Difficulty: {}\nMode: {} ({mode_desc})\nParticipants: {}\n\
             Warmup exercises: {}\nMain part exercises: {}\nCooldown exercises: {}\n\
             Rest between exercises: {}s\n",
            request.difficulty.as_str(),
            request.mode.as_str(),
            request.participant_count,
            request.warmup_count,
            request.main_part_size(),
            request.cooldown_count,
            request.rest_time_secs,
        );
        if let Some(minutes) = request.duration_minutes {
            prompt.push_str(&format!("Total duration: about {minutes} minutes\n"));
        }
        if let Some(name) = &request.target_person_name {
            prompt.push_str(&format!("Planned for: {name}\n"));
        }
        if !candidates.is_empty() {
            prompt.push_str("\nCANDIDATES:\n");
            for c in candidates {
                prompt.push_str(&format!("- {c}\n"));
            }
        }
        prompt
    }
}

#[async_trait::async_trait]
impl PlanGenerator for LlmPlanGenerator {
    async fn generate(&self, request: &PlanRequest) -> Result<TrainingPlan, PlanError> {
        let query = format!(
            "ćwiczenia rozgrzewka {} {} rozciąganie",
            request.difficulty.as_str(),
            request.mode.as_str()
        );
        let candidates = match self.retriever.retrieve(&query, self.candidates).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "exercise retrieval failed, planning without candidates");
                Vec::new()
            }
        };

        let completion = CompletionRequest {
            messages: vec![
                ChatMessage::system(PLAN_SYSTEM_PROMPT),
                ChatMessage::user(Self::user_prompt(request, &candidates)),
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let response = self.provider.complete(completion).await?;
        let plan = parse_plan(&response.content)?;
        tracing::info!(
            difficulty = request.difficulty.as_str(),
            mode = request.mode.as_str(),
            exercises = plan.exercise_count(),
            "training plan generated"
        );
        Ok(plan)
    }
}

/// Parse the first JSON object in a model reply. Replies often wrap the
/// object in prose or a code fence.
pub fn parse_plan(reply: &str) -> Result<TrainingPlan, PlanError> {
    let json = first_json_object(reply).ok_or_else(|| PlanError::Malformed("brak obiektu JSON".into()))?;
    let plan: TrainingPlan = serde_json::from_str(json).map_err(|e| PlanError::Malformed(e.to_string()))?;
    if plan.main_part.is_empty() {
        return Err(PlanError::Malformed("pusta część główna".into()));
    }
    Ok(plan)
}

/// Slice of the first balanced `{...}` in `text`, string-literal aware.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
