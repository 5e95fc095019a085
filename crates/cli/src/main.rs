mod repl;
mod server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use trener_core::chat::{ChatService, ContextRetriever, KeywordRetriever, LlmResponder, NoRetrieval};
use trener_core::commands::{CommandExecutor, InMemorySessionStore, SessionStore};
use trener_core::config::TrenerCfg;
use trener_core::planner::LlmPlanGenerator;
use trener_core::storage::{JsonFileStore, PgStore, Storage};
use trener_llm::provider::LlmProvider;

const DB_CONNECT_TIMEOUT_SECS: u64 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let repl_mode = std::env::args().nth(1).as_deref() == Some("repl");
    init_tracing(repl_mode)?;

    // DATABASE_URL (optional; no DB = JSON store only)
    let mut startup_notice: Option<String> = None;
    let pool = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let connect_result = tokio::time::timeout(
                Duration::from_secs(DB_CONNECT_TIMEOUT_SECS),
                sqlx::postgres::PgPoolOptions::new().max_connections(8).connect(&url),
            )
            .await;

            match connect_result {
                Ok(Ok(pool)) => match sqlx::migrate!("../../migrations").run(&pool).await {
                    Ok(()) => {
                        tracing::info!("database connected and migrations applied");
                        Some(pool)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "database migration failed, using the JSON store only");
                        startup_notice = Some("Uwaga: migracja bazy danych nie powiodła się, dane trafiają do plików JSON.".into());
                        None
                    }
                },
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "failed to connect DATABASE_URL, using the JSON store only");
                    startup_notice = Some("Uwaga: brak połączenia z bazą danych, dane trafiają do plików JSON.".into());
                    None
                }
                Err(_) => {
                    tracing::warn!(timeout_secs = DB_CONNECT_TIMEOUT_SECS, "database connect timed out, using the JSON store only");
                    startup_notice = Some(format!(
                        "Uwaga: przekroczono czas połączenia z bazą ({DB_CONNECT_TIMEOUT_SECS}s), dane trafiają do plików JSON."
                    ));
                    None
                }
            }
        }
        Err(_) => {
            tracing::info!("DATABASE_URL not set, using the JSON store only");
            None
        }
    };

    let cfg = match &pool {
        Some(pool) => TrenerCfg::load(pool).await?,
        None => TrenerCfg::default(),
    };
    let cfg = Arc::new(cfg.with_env_overrides());

    // Postgres first when available, the JSON files always behind it.
    let mut storage = Storage::default();
    if let Some(pool) = pool {
        storage = storage.with_tier(Arc::new(PgStore::new(pool)));
    }
    storage = storage.with_tier(Arc::new(JsonFileStore::new(&cfg.data_dir)));
    tracing::info!(tiers = ?storage.names(), "storage ready");

    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let executor = CommandExecutor::new(storage, sessions.clone(), cfg.clone());

    let retriever = knowledge_retriever();
    let llm: Option<Arc<dyn LlmProvider>> = trener_llm::http::from_env().map(|p| {
        tracing::info!(name = p.name(), model = p.model(), "LLM provider initialized");
        Arc::new(p) as _
    });
    if llm.is_none() {
        tracing::warn!("TRENER_LLM_MODEL / TRENER_LLM_API_KEY not set; plans and free-form answers are disabled");
    }

    let mut chat = ChatService::new(executor, cfg.clone()).with_retriever(retriever.clone());
    if let Some(llm) = &llm {
        chat = chat
            .with_planner(Arc::new(
                LlmPlanGenerator::new(llm.clone(), retriever.clone()).with_sampling(cfg.llm_max_tokens.max(2048), cfg.llm_temperature),
            ))
            .with_responder(Arc::new(
                LlmResponder::new(llm.clone(), cfg.history_window).with_sampling(cfg.llm_max_tokens, cfg.llm_temperature),
            ));
    }
    let chat = Arc::new(chat);

    let token = CancellationToken::new();
    spawn_shutdown_listener(token.clone());
    let reaper = spawn_session_reaper(sessions, cfg.session_sweep_interval_secs, token.clone());

    let result = if repl_mode {
        repl::run(chat, token.clone(), startup_notice).await
    } else {
        if let Some(notice) = startup_notice {
            tracing::warn!("{notice}");
        }
        let state = server::AppState { chat, llm_configured: llm.is_some() };
        server::serve(state, &cfg.bind_addr, token.clone()).await
    };

    token.cancel();
    if let Some(reaper) = reaper {
        let _ = reaper.await;
    }
    result
}

/// Logs go to stderr, or to a file in REPL mode so they do not garble the prompt.
fn init_tracing(repl_mode: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("TRENER_LOG_JSON").is_ok_and(|v| v == "1");

    if repl_mode {
        let path = std::env::var("TRENER_LOG_FILE").unwrap_or_else(|_| "/tmp/trener.log".into());
        let file = std::fs::File::create(path)?;
        let layer = fmt::layer().with_target(true).with_ansi(false).with_writer(file);
        if json {
            tracing_subscriber::registry().with(filter).with(layer.json()).init();
        } else {
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    } else if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
    }
    Ok(())
}

fn knowledge_retriever() -> Arc<dyn ContextRetriever> {
    let Ok(path) = std::env::var("TRENER_KNOWLEDGE_FILE") else {
        return Arc::new(NoRetrieval);
    };
    let path = PathBuf::from(path);
    match KeywordRetriever::from_file(&path) {
        Ok(retriever) => {
            tracing::info!(path = %path.display(), snippets = retriever.len(), "knowledge base loaded");
            Arc::new(retriever)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "knowledge base not loaded");
            Arc::new(NoRetrieval)
        }
    }
}

/// Periodically drop expired pending actions. `interval_secs == 0` disables it.
fn spawn_session_reaper(
    sessions: Arc<dyn SessionStore>,
    interval_secs: u64,
    token: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    if interval_secs == 0 {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    let purged = sessions.purge_expired(chrono::Utc::now());
                    if purged > 0 {
                        tracing::debug!(purged, remaining = sessions.len(), "expired pending actions purged");
                    }
                }
            }
        }
    }))
}

fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let Ok(mut sigterm) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
                let _ = tokio::signal::ctrl_c().await;
                token.cancel();
                return;
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            token.cancel();
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        }
    });
}
