use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;

/// Prefix for environment overrides, e.g. `TRENER_PENDING_TTL_SECS=120`.
const ENV_PREFIX: &str = "TRENER_";

/// All trener tunables. Loaded from the `trener_config` table at startup;
/// first boot writes defaults. Environment variables override either source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrenerCfg {
    // confirmation sessions
    pub pending_ttl_secs: u64,
    pub session_sweep_interval_secs: u64,

    // generative fallback
    pub history_window: usize,
    pub retrieval_top_k: usize,
    pub collaborator_timeout_secs: u64,

    // plan generation defaults
    pub plan_rest_time_secs: u32,
    pub plan_warmup_count: u32,
    pub plan_main_count: u32,
    pub plan_cooldown_count: u32,
    pub plan_max_participants: u32,
    pub training_history_limit: usize,

    // LLM
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,

    // process
    pub data_dir: String,
    pub bind_addr: String,
}

impl Default for TrenerCfg {
    fn default() -> Self {
        Self {
            pending_ttl_secs: 300,
            session_sweep_interval_secs: 60,
            history_window: 6,
            retrieval_top_k: 5,
            collaborator_timeout_secs: 60,
            plan_rest_time_secs: 60,
            plan_warmup_count: 3,
            plan_main_count: 5,
            plan_cooldown_count: 3,
            plan_max_participants: 50,
            training_history_limit: 10,
            llm_max_tokens: 1024,
            llm_temperature: 0.3,
            data_dir: "data".into(),
            bind_addr: "0.0.0.0:8000".into(),
        }
    }
}

impl TrenerCfg {
    /// Load config from `trener_config`. If the table is empty, seed it with defaults.
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM trener_config")
                .fetch_all(pool)
                .await?;

        if rows.is_empty() {
            let cfg = Self::default();
            cfg.seed(pool).await?;
            return Ok(cfg);
        }

        let map: HashMap<String, String> = rows.into_iter().collect();
        Ok(Self::from_map(&map))
    }

    /// Apply `TRENER_<KEY>` overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(std::env::vars())
    }

    /// Apply overrides from `(name, value)` pairs using the env naming scheme.
    pub fn with_overrides<I>(self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut map: HashMap<String, String> = self
            .to_entries()
            .into_iter()
            .map(|(key, value, _)| (key.to_string(), value))
            .collect();
        for (name, value) in vars {
            if let Some(key) = name.strip_prefix(ENV_PREFIX) {
                let key = key.to_ascii_lowercase();
                if map.contains_key(&key) {
                    map.insert(key, value);
                }
            }
        }
        Self::from_map(&map)
    }

    /// Write all default values into `trener_config`.
    async fn seed(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        for (key, value, desc) in &self.to_entries() {
            sqlx::query(
                "INSERT INTO trener_config (key, value, description) VALUES ($1, $2, $3) \
                 ON CONFLICT (key) DO NOTHING",
            )
            .bind(key)
            .bind(value)
            .bind(desc)
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            pending_ttl_secs: get_or(m, "pending_ttl_secs", d.pending_ttl_secs),
            session_sweep_interval_secs: get_or(m, "session_sweep_interval_secs", d.session_sweep_interval_secs),
            history_window: get_or(m, "history_window", d.history_window),
            retrieval_top_k: get_or(m, "retrieval_top_k", d.retrieval_top_k),
            collaborator_timeout_secs: get_or(m, "collaborator_timeout_secs", d.collaborator_timeout_secs),
            plan_rest_time_secs: get_or(m, "plan_rest_time_secs", d.plan_rest_time_secs),
            plan_warmup_count: get_or(m, "plan_warmup_count", d.plan_warmup_count),
            plan_main_count: get_or(m, "plan_main_count", d.plan_main_count),
            plan_cooldown_count: get_or(m, "plan_cooldown_count", d.plan_cooldown_count),
            plan_max_participants: get_or(m, "plan_max_participants", d.plan_max_participants),
            training_history_limit: get_or(m, "training_history_limit", d.training_history_limit),
            llm_max_tokens: get_or(m, "llm_max_tokens", d.llm_max_tokens),
            llm_temperature: get_or(m, "llm_temperature", d.llm_temperature),
            data_dir: get_or(m, "data_dir", d.data_dir),
            bind_addr: get_or(m, "bind_addr", d.bind_addr),
        }
    }

    fn to_entries(&self) -> Vec<(&'static str, String, &'static str)> {
        vec![
            ("pending_ttl_secs", self.pending_ttl_secs.to_string(), "Seconds a staged action waits for confirmation"),
            ("session_sweep_interval_secs", self.session_sweep_interval_secs.to_string(), "Expired pending action sweep period (0 = off)"),
            ("history_window", self.history_window.to_string(), "History turns sent to the generative fallback"),
            ("retrieval_top_k", self.retrieval_top_k.to_string(), "Knowledge snippets retrieved per question"),
            ("collaborator_timeout_secs", self.collaborator_timeout_secs.to_string(), "Timeout for plan generation and fallback calls"),
            ("plan_rest_time_secs", self.plan_rest_time_secs.to_string(), "Default rest between exercises"),
            ("plan_warmup_count", self.plan_warmup_count.to_string(), "Warmup exercises per plan"),
            ("plan_main_count", self.plan_main_count.to_string(), "Main exercises per plan in common mode"),
            ("plan_cooldown_count", self.plan_cooldown_count.to_string(), "Cooldown exercises per plan"),
            ("plan_max_participants", self.plan_max_participants.to_string(), "Upper bound on participants per plan"),
            ("training_history_limit", self.training_history_limit.to_string(), "Plans listed by the training history command"),
            ("llm_max_tokens", self.llm_max_tokens.to_string(), "LLM completion token limit"),
            ("llm_temperature", self.llm_temperature.to_string(), "LLM sampling temperature"),
            ("data_dir", self.data_dir.clone(), "Directory of the JSON fallback store"),
            ("bind_addr", self.bind_addr.clone(), "HTTP listen address"),
        ]
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
