use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use docrag_core::document::DocumentService;
use docrag_core::model::Document;
use docrag_core::Error;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WorkspaceQuery {
    pub workspace_id: Uuid,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub document_id: Uuid,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub document_status: docrag_core::model::DocumentStatus,
}

/// `POST /v1/documents/upload?workspace_id=...`: single file part; replies
/// 202 once the blob is persisted and the ingestion job is queued.
pub async fn upload_document(
    State(state): State<AppState>,
    Query(query): Query<WorkspaceQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut file_name: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(format!("malformed multipart body: {e}")))?
    {
        if field.file_name().is_some() || field.name() == Some("file") {
            file_name = field
                .file_name()
                .map(str::to_string)
                .or_else(|| field.name().map(str::to_string));
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| Error::Validation(format!("failed to read file part: {e}")))?
                    .to_vec(),
            );
            break;
        }
    }

    let file_name = file_name.ok_or_else(|| Error::Validation("file part is required".into()))?;
    let bytes = bytes.ok_or_else(|| Error::Validation("file part is required".into()))?;

    let document = DocumentService::new(&state.context)
        .ingest_upload(query.workspace_id, &file_name, bytes, &state.queue)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            document_id: document.id,
        }),
    ))
}

/// `GET /v1/documents?workspace_id=...`
pub async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<WorkspaceQuery>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let documents = DocumentService::new(&state.context)
        .list(query.workspace_id)
        .await?;
    Ok(Json(documents))
}

/// `GET /v1/documents/{id}/status`
pub async fn document_status(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = DocumentService::new(&state.context)
        .status(document_id)
        .await?;
    Ok(Json(StatusResponse {
        document_status: status,
    }))
}

/// `GET /v1/documents/{id}/download`: streams the original bytes with
/// attachment headers; the blob handle lives exactly as long as the
/// response body.
pub async fn download_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let (document, object) = DocumentService::new(&state.context)
        .open_download(document_id)
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&document.media_type)
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(object.size));
    let disposition = format!(
        "attachment; filename=\"{}\"",
        document.document_name.replace('"', "")
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .unwrap_or(HeaderValue::from_static("attachment")),
    );

    let mut response = Response::new(Body::from_stream(ReaderStream::new(object.reader)));
    response.headers_mut().extend(headers);
    Ok(response)
}
