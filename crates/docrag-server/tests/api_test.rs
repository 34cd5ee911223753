//! HTTP contract tests: the axum router wired to local adapters with
//! deterministic stubs, driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document as PdfDocument, Object, Stream};
use serde_json::Value;
use tower::ServiceExt;

use docrag_core::config::Settings;
use docrag_core::context::AppContext;
use docrag_core::database::{DbPool, Repository};
use docrag_core::embedding::StubEmbedder;
use docrag_core::llm::StubLlmClient;
use docrag_core::pipeline::{run_worker, JobQueue};
use docrag_core::storage::LocalRawStorage;
use docrag_core::vectorstore::{Distance, LocalVectorStore, VectorStore};
use docrag_server::state::AppState;
use docrag_server::build_router;

const DIM: usize = 32;
const BOUNDARY: &str = "docrag-test-boundary";

async fn test_app(dir: &tempfile::TempDir) -> Router {
    let settings = Settings {
        local_storage_path: dir.path().to_string_lossy().to_string(),
        qdrant_vector_size: DIM,
        ..Settings::default()
    };

    let pool = DbPool::connect(&settings).await.unwrap();
    let repository = Arc::new(Repository::new(pool));
    repository.ensure_schema().await.unwrap();

    let raw_storage = Arc::new(LocalRawStorage::new(settings.raw_storage_root()).unwrap());
    let vector_store = Arc::new(LocalVectorStore::new(settings.vector_storage_root()).unwrap());
    vector_store
        .ensure_collection(DIM, Distance::Cosine)
        .await
        .unwrap();

    let context = AppContext::from_parts(
        settings,
        repository,
        raw_storage,
        vector_store,
        Arc::new(StubEmbedder::new(DIM)),
        Arc::new(StubLlmClient),
    );

    let (queue, receiver) = JobQueue::new(16);
    tokio::spawn(run_worker(0, context.clone(), receiver.clone()));

    build_router(AppState { context, queue })
}

fn multipart_body(file_name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn build_pdf(page_texts: &[&str]) -> Vec<u8> {
    let mut doc = PdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in page_texts {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

async fn json_response(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_workspace(app: &Router, name: &str) -> String {
    let (status, json) = json_response(
        app,
        Request::builder()
            .method("POST")
            .uri(format!("/v1/workspaces?name={name}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_string()
}

async fn upload_pdf(app: &Router, workspace_id: &str, pages: &[&str]) -> String {
    let body = multipart_body("doc.pdf", &build_pdf(pages));
    let (status, json) = json_response(
        app,
        Request::builder()
            .method("POST")
            .uri(format!("/v1/documents/upload?workspace_id={workspace_id}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    json["document_id"].as_str().unwrap().to_string()
}

async fn wait_for_success(app: &Router, document_id: &str) {
    for _ in 0..200 {
        let (status, json) = json_response(
            app,
            Request::builder()
                .uri(format!("/v1/documents/{document_id}/status"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        match json["document_status"].as_str().unwrap() {
            "SUCCESS" => return,
            "FAILED" => panic!("document failed during ingestion"),
            _ => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    panic!("document never reached SUCCESS");
}

#[tokio::test]
async fn workspace_lifecycle_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir).await;

    let id = create_workspace(&app, "research").await;

    // Duplicate names conflict.
    let (status, json) = json_response(
        &app,
        Request::builder()
            .method("POST")
            .uri("/v1/workspaces?name=research")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "Conflict");

    let (status, json) = json_response(
        &app,
        Request::builder().uri("/v1/workspaces").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["id"].as_str().unwrap(), id);

    // Missing name is a validation error.
    let (status, _) = json_response(
        &app,
        Request::builder()
            .method("POST")
            .uri("/v1/workspaces")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_of_png_magic_returns_415() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir).await;
    let workspace_id = create_workspace(&app, "w").await;

    let png = [0x89u8, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    let body = multipart_body("image.png", &png);
    let (status, json) = json_response(
        &app,
        Request::builder()
            .method("POST")
            .uri(format!("/v1/documents/upload?workspace_id={workspace_id}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json["error"], "UnsupportedMedia");

    // No document row was created.
    let (status, json) = json_response(
        &app,
        Request::builder()
            .uri(format!("/v1/documents?workspace_id={workspace_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn ingest_ask_and_history_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir).await;
    let workspace_id = create_workspace(&app, "w1").await;

    let document_id = upload_pdf(
        &app,
        &workspace_id,
        &[
            "alpha The opening page of this English report describes the project goals.",
            "beta The middle page lists the quarterly results in detail.",
            "gamma The final page summarizes the conclusions.",
        ],
    )
    .await;
    wait_for_success(&app, &document_id).await;

    // Document listing shows the ingested file.
    let (status, json) = json_response(
        &app,
        Request::builder()
            .uri(format!("/v1/documents?workspace_id={workspace_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["document_name"], "doc.pdf");
    assert_eq!(json[0]["page_count"], 3);
    assert_eq!(json[0]["status"], "SUCCESS");

    // Ask a question; a session is created on the fly.
    let (status, json) = json_response(
        &app,
        Request::builder()
            .method("POST")
            .uri("/v1/chat/ask")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(
                r#"{{"workspace_id":"{workspace_id}","question":"what is on page 2?"}}"#
            )))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!json["answer"].as_str().unwrap().is_empty());
    let sources = json["sources"].as_array().unwrap();
    assert!(!sources.is_empty());
    assert_eq!(sources[0]["document_name"], "doc.pdf");
    assert!(sources[0]["page_start"].as_i64().unwrap() <= sources[0]["page_end"].as_i64().unwrap());
    let session_id = json["session_id"].as_str().unwrap().to_string();

    // Session listing and message history.
    let (status, json) = json_response(
        &app,
        Request::builder()
            .uri(format!("/v1/chat?workspace_id={workspace_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (status, json) = json_response(
        &app,
        Request::builder()
            .uri(format!("/v1/chat/{session_id}/messages"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let messages = json.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");

    // Download returns the original bytes with attachment headers.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/documents/{document_id}/download"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("attachment"));
    assert!(disposition.contains("doc.pdf"));
    let length: usize = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.len(), length);
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn ask_in_empty_workspace_returns_200_with_empty_sources() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir).await;
    let workspace_id = create_workspace(&app, "empty").await;

    let (status, json) = json_response(
        &app,
        Request::builder()
            .method("POST")
            .uri("/v1/chat/ask")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(
                r#"{{"workspace_id":"{workspace_id}","question":"hello?"}}"#
            )))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["sources"].as_array().unwrap().is_empty());
    assert!(json["answer"].as_str().unwrap().contains("No documents"));
}

#[tokio::test]
async fn ask_with_unknown_session_returns_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir).await;
    let workspace_id = create_workspace(&app, "w").await;

    let (status, json) = json_response(
        &app,
        Request::builder()
            .method("POST")
            .uri("/v1/chat/ask")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(
                r#"{{"workspace_id":"{workspace_id}","question":"q","session_id":"00000000-0000-0000-0000-000000000001"}}"#
            )))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "NotFound");
}

#[tokio::test]
async fn workspace_delete_cascades_in_background() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir).await;
    let workspace_id = create_workspace(&app, "doomed").await;

    let document_id = upload_pdf(
        &app,
        &workspace_id,
        &["alpha This page exists only to be deleted with its workspace."],
    )
    .await;
    wait_for_success(&app, &document_id).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/v1/workspaces/{workspace_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The purge runs in the background; poll until the workspace is gone.
    for _ in 0..200 {
        let (_, json) = json_response(
            &app,
            Request::builder().uri("/v1/workspaces").body(Body::empty()).unwrap(),
        )
        .await;
        if json.as_array().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let (status, _) = json_response(
        &app,
        Request::builder()
            .uri(format!("/v1/documents/{document_id}/download"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_upload_returns_413() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        local_storage_path: dir.path().to_string_lossy().to_string(),
        qdrant_vector_size: DIM,
        max_upload_bytes: 128,
        ..Settings::default()
    };

    let pool = DbPool::connect(&settings).await.unwrap();
    let repository = Arc::new(Repository::new(pool));
    repository.ensure_schema().await.unwrap();
    let raw_storage = Arc::new(LocalRawStorage::new(settings.raw_storage_root()).unwrap());
    let vector_store = Arc::new(LocalVectorStore::new(settings.vector_storage_root()).unwrap());
    vector_store
        .ensure_collection(DIM, Distance::Cosine)
        .await
        .unwrap();
    let context = AppContext::from_parts(
        settings,
        repository,
        raw_storage,
        vector_store,
        Arc::new(StubEmbedder::new(DIM)),
        Arc::new(StubLlmClient),
    );
    let (queue, _receiver) = JobQueue::new(4);
    let app = build_router(AppState { context, queue });

    let workspace_id = create_workspace(&app, "small").await;
    let body = multipart_body("doc.pdf", &build_pdf(&["page one text well above the cap"]));
    let (status, json) = json_response(
        &app,
        Request::builder()
            .method("POST")
            .uri(format!("/v1/documents/upload?workspace_id={workspace_id}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["error"], "PayloadTooLarge");
}

#[tokio::test]
async fn ops_status_reports_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir).await;

    let (status, json) = json_response(
        &app,
        Request::builder().uri("/v1/ops/status").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["api"], "ok");
    assert_eq!(json["database"], "ok");
    assert_eq!(json["vector_store"], "ok");
    assert_eq!(json["raw_storage"], "ok");
    assert_eq!(json["llm"], "stub");
}
