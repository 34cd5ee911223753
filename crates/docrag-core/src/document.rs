use std::time::Duration;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::extraction::{detect_media_type, ExtractorFactory};
use crate::model::{Document, DocumentStatus};
use crate::pipeline::{Job, JobQueue};
use crate::storage::ObjectStream;
use crate::util::{sanitize_filename, sha256_hex};

/// How long an upload may wait for a queue slot before the request is
/// rejected with a retryable error.
const QUEUE_SUBMIT_DEADLINE: Duration = Duration::from_secs(5);

/// Upload intake and document queries. The upload path is the pipeline
/// trigger: persist the blob, insert the PENDING row, enqueue the job.
pub struct DocumentService<'a> {
    context: &'a AppContext,
}

impl<'a> DocumentService<'a> {
    pub fn new(context: &'a AppContext) -> Self {
        Self { context }
    }

    pub async fn ingest_upload(
        &self,
        workspace_id: Uuid,
        file_name: &str,
        bytes: Vec<u8>,
        queue: &JobQueue,
    ) -> Result<Document> {
        let context = self.context;
        context.repository.get_workspace(workspace_id).await?;

        let max = context.settings.max_upload_bytes;
        if bytes.len() as u64 > max {
            return Err(Error::PayloadTooLarge {
                size: bytes.len() as u64,
                max,
            });
        }
        if bytes.is_empty() {
            return Err(Error::Validation("uploaded file is empty".into()));
        }

        // The media type comes from the bytes, never from the file name.
        let media_type = detect_media_type(&bytes)
            .ok_or_else(|| Error::UnsupportedMedia("unknown".into()))?;
        if !ExtractorFactory::supported(media_type) {
            return Err(Error::UnsupportedMedia(media_type.to_string()));
        }

        let document_id = Uuid::new_v4();
        let document = Document {
            id: document_id,
            workspace_id,
            document_name: file_name.to_string(),
            media_type: media_type.to_string(),
            sha256: sha256_hex(&bytes),
            raw_storage_path: format!(
                "{workspace_id}/{document_id}-{}",
                sanitize_filename(file_name)
            ),
            size_bytes: bytes.len() as i64,
            page_count: None,
            author: None,
            creation_date: None,
            detected_language: None,
            status: DocumentStatus::Pending,
            error_message: None,
            ingested_at: None,
            created_at: Utc::now(),
        };

        context
            .raw_storage
            .put(&document.raw_storage_path, &bytes)
            .await?;

        if let Err(e) = context.repository.create_document(&document).await {
            // Duplicate content or a failed insert: the blob must not
            // outlive its metadata row.
            let _ = context.raw_storage.delete(&document.raw_storage_path).await;
            return Err(e);
        }

        // QUEUED is set before the job is handed over; a worker may claim
        // the document the moment it is enqueued.
        context
            .repository
            .update_document_status(document_id, DocumentStatus::Queued, None)
            .await?;
        if let Err(e) = queue
            .submit(Job::Ingest { document_id }, QUEUE_SUBMIT_DEADLINE)
            .await
        {
            let _ = context.repository.delete_document(document_id).await;
            let _ = context.raw_storage.delete(&document.raw_storage_path).await;
            return Err(e);
        }

        info!(%document_id, %workspace_id, media_type, "document accepted for ingestion");
        Ok(document)
    }

    pub async fn list(&self, workspace_id: Uuid) -> Result<Vec<Document>> {
        self.context.repository.get_workspace(workspace_id).await?;
        self.context.repository.list_documents(workspace_id).await
    }

    pub async fn status(&self, document_id: Uuid) -> Result<DocumentStatus> {
        Ok(self.context.repository.get_document(document_id).await?.status)
    }

    /// Document row plus an opened blob stream for a download response.
    pub async fn open_download(&self, document_id: Uuid) -> Result<(Document, ObjectStream)> {
        let document = self.context.repository.get_document(document_id).await?;
        let stream = self
            .context
            .raw_storage
            .open(&document.raw_storage_path)
            .await?;
        Ok((document, stream))
    }
}
