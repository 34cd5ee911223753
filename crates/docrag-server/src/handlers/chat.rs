use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;

use docrag_core::model::{ChatMessage, ChatSession};
use docrag_core::rag::{AskRequest, AskResponse, RagEngine};

use crate::error::ApiError;
use crate::handlers::documents::WorkspaceQuery;
use crate::state::AppState;

/// `POST /v1/chat/ask`
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let response = RagEngine::new(state.context.clone()).ask(request).await?;
    Ok(Json(response))
}

/// `GET /v1/chat?workspace_id=...`
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<WorkspaceQuery>,
) -> Result<Json<Vec<ChatSession>>, ApiError> {
    state
        .context
        .repository
        .get_workspace(query.workspace_id)
        .await?;
    let sessions = state
        .context
        .repository
        .list_sessions(query.workspace_id)
        .await?;
    Ok(Json(sessions))
}

/// `GET /v1/chat/{session_id}/messages`, oldest first.
pub async fn session_messages(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    state.context.repository.get_session(session_id).await?;
    let messages = state.context.repository.list_messages(session_id).await?;
    Ok(Json(messages))
}
