use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use docrag_core::vectorstore::SearchFilter;

use crate::state::AppState;

fn check(result: Result<(), docrag_core::Error>) -> Value {
    match result {
        Ok(()) => json!("ok"),
        Err(e) => json!({
            "status": "unavailable",
            "error_message": e.to_string(),
        }),
    }
}

/// `GET /v1/ops/status`: health of the service's dependencies. Each
/// probe is cheap and scoped to a nonexistent workspace so it cannot
/// touch real data.
pub async fn service_status(State(state): State<AppState>) -> Json<Value> {
    let context = &state.context;

    let database = check(context.repository.ping().await);

    let probe = vec![0.0f32; context.embedder.dim().max(1)];
    let vector_store = check(
        context
            .vector_store
            .search(&probe, 1, &SearchFilter::workspace(Uuid::nil()))
            .await
            .map(|_| ()),
    );

    let raw_storage = check(
        context
            .raw_storage
            .exists(".healthcheck")
            .await
            .map(|_| ()),
    );

    Json(json!({
        "api": "ok",
        "database": database,
        "vector_store": vector_store,
        "raw_storage": raw_storage,
        "llm": if context.settings.llm_url.is_some() { "configured" } else { "stub" },
        "embedding_model": context.embedder.model_name(),
    }))
}
