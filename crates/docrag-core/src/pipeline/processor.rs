use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunker::{Chunk, TextChunker};
use crate::context::AppContext;
use crate::embedding::encode_in_batches;
use crate::error::{Error, Result};
use crate::extraction::{
    detect_media_type, pages_to_text, ExtractedDocument, ExtractorFactory,
};
use crate::model::{DocumentStage, DocumentStatus};
use crate::util::{detect_language, with_deadline, with_retries};
use crate::vectorstore::{VectorPayload, VectorPoint};

const STAGE_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);
const LANG_SAMPLE_CHARS: usize = 1000;

/// Deterministic point id for a chunk: re-running the pipeline for the
/// same document upserts the same ids, so the index converges instead of
/// accumulating duplicates.
pub fn chunk_point_id(document_id: Uuid, chunk_index: i64) -> Uuid {
    Uuid::new_v5(&document_id, &chunk_index.to_be_bytes())
}

/// Runs the ingestion pipeline for one document end-to-end:
/// extract -> detect language -> chunk -> embed -> index -> commit.
///
/// Stage events are written on entry and exit; any failure marks the
/// document FAILED with a short message. Already-indexed vectors are left
/// in place so a retry converges via the deterministic point ids.
pub struct DocumentProcessor {
    context: Arc<AppContext>,
    chunker: TextChunker,
}

impl DocumentProcessor {
    pub fn new(context: Arc<AppContext>) -> Self {
        let settings = &context.settings;
        let chunker = TextChunker::new(
            settings.chunk_size,
            settings.chunk_overlap,
            settings.snippet_max_chars,
        );
        Self { context, chunker }
    }

    pub async fn process_document(&self, document_id: Uuid) -> Result<()> {
        let repository = &self.context.repository;

        if !repository.try_claim_for_processing(document_id).await? {
            info!(%document_id, "document already claimed or finished, skipping");
            return Ok(());
        }
        info!(%document_id, "processing document");

        match self.run_pipeline(document_id).await {
            Ok(()) => {
                info!(%document_id, "document processed");
                Ok(())
            }
            Err(e) => {
                let message = e.pipeline_message();
                repository
                    .update_document_status(document_id, DocumentStatus::Failed, Some(&message))
                    .await?;

                // An unsupported blob can never be processed; drop it.
                // Everything else keeps its blob for a retry.
                if matches!(e, Error::UnsupportedMedia(_)) {
                    if let Ok(document) = repository.get_document(document_id).await {
                        let _ = self
                            .context
                            .raw_storage
                            .delete(&document.raw_storage_path)
                            .await;
                    }
                }
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, document_id: Uuid) -> Result<()> {
        let context = &self.context;
        let document = context.repository.get_document(document_id).await?;

        let raw_storage = context.raw_storage.clone();
        let raw_path = document.raw_storage_path.clone();
        let bytes = with_retries("raw_storage.get", STAGE_ATTEMPTS, RETRY_BASE_DELAY, || {
            let raw_storage = raw_storage.clone();
            let path = raw_path.clone();
            async move { raw_storage.get(&path).await }
        })
        .await?;

        let extracted = self.extract_stage(document_id, &bytes).await?;

        let detected_language = match self.lang_detect_stage(document_id, &extracted).await {
            Ok(language) => language,
            Err(e) => {
                // Language detection never fails the document.
                warn!(%document_id, error = %e, "language detection failed, continuing");
                None
            }
        };

        // No classifier ships with the service; the stage is recorded as
        // skipped so the event trail stays complete.
        let now = Utc::now();
        context
            .repository
            .upsert_stage_event(
                document_id,
                DocumentStage::Classification,
                DocumentStatus::Skipped,
                now,
                Some(now),
                Some(0),
            )
            .await?;

        let chunks = self.chunking_stage(document_id, &extracted).await?;
        let embeddings = self.embedding_stage(document_id, &chunks).await?;

        if embeddings.len() != chunks.len() {
            return Err(Error::Internal(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let points: Vec<VectorPoint> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| VectorPoint {
                id: chunk_point_id(document_id, chunk.index),
                vector,
                payload: VectorPayload {
                    workspace_id: document.workspace_id,
                    document_id,
                    document_name: document.document_name.clone(),
                    page_start: chunk.page_start,
                    page_end: chunk.page_end,
                    snippet: chunk.snippet.clone(),
                },
            })
            .collect();

        let vector_store = context.vector_store.clone();
        with_retries("vector_store.upsert", STAGE_ATTEMPTS, RETRY_BASE_DELAY, || {
            let vector_store = vector_store.clone();
            let points = points.clone();
            async move { vector_store.upsert(points).await }
        })
        .await?;

        context
            .repository
            .commit_document_success(
                document_id,
                extracted.page_count,
                extracted.author.as_deref(),
                extracted.creation_date,
                detected_language.as_deref(),
            )
            .await?;
        Ok(())
    }

    async fn extract_stage(
        &self,
        document_id: Uuid,
        bytes: &[u8],
    ) -> Result<ExtractedDocument> {
        let bytes = bytes.to_vec();
        self.run_stage(document_id, DocumentStage::Extracting, || {
            let bytes = bytes.clone();
            async move {
                let media_type = detect_media_type(&bytes)
                    .ok_or_else(|| Error::UnsupportedMedia("unknown".into()))?;
                let extractor = ExtractorFactory::for_media_type(media_type)?;

                let extracted = tokio::task::spawn_blocking(move || extractor.extract(&bytes))
                    .await
                    .map_err(|e| Error::Internal(format!("extraction task panicked: {e}")))??;

                if extracted.pages.is_empty() {
                    return Err(Error::Permanent("no extractable text".into()));
                }
                Ok(extracted)
            }
        })
        .await
    }

    async fn lang_detect_stage(
        &self,
        document_id: Uuid,
        extracted: &ExtractedDocument,
    ) -> Result<Option<String>> {
        let sample = pages_to_text(&extracted.pages, LANG_SAMPLE_CHARS);
        self.run_stage(document_id, DocumentStage::LangDetect, || {
            let sample = sample.clone();
            async move {
                if sample.trim().is_empty() {
                    return Ok(None);
                }
                Ok(detect_language(&sample))
            }
        })
        .await
    }

    async fn chunking_stage(
        &self,
        document_id: Uuid,
        extracted: &ExtractedDocument,
    ) -> Result<Vec<Chunk>> {
        self.run_stage(document_id, DocumentStage::Chunking, || {
            let chunks = self.chunker.split_pages(&extracted.pages);
            async move {
                if chunks.is_empty() {
                    return Err(Error::Permanent("splitter produced no chunks".into()));
                }
                Ok(chunks)
            }
        })
        .await
    }

    async fn embedding_stage(
        &self,
        document_id: Uuid,
        chunks: &[Chunk],
    ) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embedder = self.context.embedder.clone();
        let batch_size = self.context.settings.embed_batch_size;

        self.run_stage(document_id, DocumentStage::Embedding, || {
            let texts = texts.clone();
            let embedder = embedder.clone();
            async move { encode_in_batches(embedder.as_ref(), &texts, batch_size).await }
        })
        .await
    }

    /// Record stage entry/exit events around the stage body. The body runs
    /// under the per-stage deadline and, for transient failures (including
    /// timeouts), is retried up to the stage budget.
    async fn run_stage<T, F, Fut>(
        &self,
        document_id: Uuid,
        stage: DocumentStage,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let repository = &self.context.repository;
        let deadline = Duration::from_secs(self.context.settings.stage_timeout_seconds);
        let started_at = Utc::now();

        repository
            .upsert_stage_event(
                document_id,
                stage,
                DocumentStatus::Processing,
                started_at,
                None,
                None,
            )
            .await?;

        let clock = Instant::now();
        let result = with_retries(stage.as_str(), STAGE_ATTEMPTS, RETRY_BASE_DELAY, || {
            with_deadline(stage.as_str(), deadline, op())
        })
        .await;
        let duration_ms = clock.elapsed().as_millis() as i64;

        let status = if result.is_ok() {
            DocumentStatus::Success
        } else {
            DocumentStatus::Failed
        };
        repository
            .upsert_stage_event(
                document_id,
                stage,
                status,
                started_at,
                Some(Utc::now()),
                Some(duration_ms),
            )
            .await?;

        result
    }
}
