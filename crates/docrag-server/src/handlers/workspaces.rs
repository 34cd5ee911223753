use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use docrag_core::model::Workspace;
use docrag_core::pipeline::Job;
use docrag_core::workspace::WorkspaceService;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct CreateWorkspaceQuery {
    name: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct CreateWorkspaceBody {
    name: Option<String>,
}

/// `POST /v1/workspaces`. The name may arrive as a query parameter or a
/// JSON body.
pub async fn create_workspace(
    State(state): State<AppState>,
    Query(query): Query<CreateWorkspaceQuery>,
    body: Option<Json<CreateWorkspaceBody>>,
) -> Result<(StatusCode, Json<Workspace>), ApiError> {
    let name = query
        .name
        .or_else(|| body.and_then(|Json(b)| b.name))
        .ok_or_else(|| {
            docrag_core::Error::Validation("workspace name is required".into())
        })?;

    let workspace = WorkspaceService::new(&state.context).create(&name).await?;
    Ok((StatusCode::CREATED, Json(workspace)))
}

/// `GET /v1/workspaces`
pub async fn list_workspaces(
    State(state): State<AppState>,
) -> Result<Json<Vec<Workspace>>, ApiError> {
    Ok(Json(WorkspaceService::new(&state.context).list().await?))
}

/// `DELETE /v1/workspaces/{id}`: returns 204 immediately; the cascade
/// (vectors, blobs, rows) runs as a background job.
pub async fn delete_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.context.repository.get_workspace(workspace_id).await?;
    state
        .queue
        .submit(Job::PurgeWorkspace { workspace_id }, Duration::from_secs(5))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
