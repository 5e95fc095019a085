use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use trener_core::chat::ChatService;
use trener_core::types::{ChatRequest, ChatResponse};

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub llm_configured: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Json<ChatResponse> {
    Json(state.chat.handle(&request).await)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "storage": state.chat.executor().storage().names(),
        "llm": state.llm_configured,
    }))
}

/// Serve until `token` is cancelled, then drain in-flight requests.
pub async fn serve(state: AppState, bind_addr: &str, token: CancellationToken) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;
    tracing::info!("server stopped");
    Ok(())
}
