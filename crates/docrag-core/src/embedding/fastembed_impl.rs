use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::Embedder;
use crate::error::{Error, Result};

/// In-process embedder backed by fastembed ONNX models. The default model
/// is a 384-dimension MiniLM variant.
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: usize,
}

fn resolve_model(name: &str) -> Option<(EmbeddingModel, usize)> {
    match name {
        "sentence-transformers/all-MiniLM-L6-v2" => Some((EmbeddingModel::AllMiniLML6V2, 384)),
        "BAAI/bge-small-en-v1.5" => Some((EmbeddingModel::BGESmallENV15, 384)),
        "BAAI/bge-base-en-v1.5" => Some((EmbeddingModel::BGEBaseENV15, 768)),
        "BAAI/bge-large-en-v1.5" => Some((EmbeddingModel::BGELargeENV15, 1024)),
        _ => None,
    }
}

impl FastEmbedder {
    pub fn new(model_name: &str) -> Result<Self> {
        let (model_enum, dimension) = resolve_model(model_name).ok_or_else(|| {
            Error::Permanent(format!(
                "unknown embedding model '{model_name}'; supported: \
                 sentence-transformers/all-MiniLM-L6-v2, BAAI/bge-{{small,base,large}}-en-v1.5"
            ))
        })?;

        info!(model = model_name, dimension, "loading embedding model");
        let model = TextEmbedding::try_new(
            InitOptions::new(model_enum).with_show_download_progress(false),
        )
        .map_err(|e| Error::Permanent(format!("failed to load embedding model: {e}")))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = texts.len(), "embedding texts");

        // Inference is CPU-bound, keep it off the async workers.
        let model = self.model.clone();
        let owned: Vec<String> = texts.to_vec();
        let embeddings = tokio::task::spawn_blocking(move || {
            let model = model.blocking_lock();
            model.embed(owned, None)
        })
        .await
        .map_err(|e| Error::Internal(format!("embedding task panicked: {e}")))?
        .map_err(|e| Error::Transient(format!("embedding inference failed: {e}")))?;

        Ok(embeddings)
    }

    fn dim(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
