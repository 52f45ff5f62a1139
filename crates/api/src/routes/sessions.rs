//! Read-only session queries
//!
//! Used by owner dashboards to recover state after reconnecting.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::ApiResult,
    session::{ChatMessage, SessionSummary},
    state::AppState,
};

/// List every session summary, most urgent first
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.engine.list_sessions().await)
}

/// Full message log for one session
pub async fn session_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let messages = state.engine.history(&session_id).await?;
    Ok(Json(messages))
}
