//! HTTP surface for docrag: routing, request/response mapping, and the
//! error-to-status translation. All behavior lives in `docrag-core`.

pub mod error;
pub mod handlers;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use state::AppState;

pub fn build_router(state: AppState) -> Router {
    // Slack above the configured cap so oversized uploads reach the
    // service layer and get a proper 413 instead of a dropped body.
    let body_limit = state.context.settings.max_upload_bytes as usize + 1024 * 1024;

    Router::new()
        .route("/v1/workspaces", post(handlers::workspaces::create_workspace))
        .route("/v1/workspaces", get(handlers::workspaces::list_workspaces))
        .route(
            "/v1/workspaces/:id",
            delete(handlers::workspaces::delete_workspace),
        )
        .route(
            "/v1/documents/upload",
            post(handlers::documents::upload_document),
        )
        .route("/v1/documents", get(handlers::documents::list_documents))
        .route(
            "/v1/documents/:id/download",
            get(handlers::documents::download_document),
        )
        .route(
            "/v1/documents/:id/status",
            get(handlers::documents::document_status),
        )
        .route("/v1/chat/ask", post(handlers::chat::ask))
        .route("/v1/chat", get(handlers::chat::list_sessions))
        .route(
            "/v1/chat/:session_id/messages",
            get(handlers::chat::session_messages),
        )
        .route("/v1/ops/status", get(handlers::ops::service_status))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}
