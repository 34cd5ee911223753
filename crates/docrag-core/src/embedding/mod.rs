pub mod fastembed_impl;
pub mod http;
pub mod stub;

pub use fastembed_impl::FastEmbedder;
pub use http::HttpEmbedder;
pub use stub::StubEmbedder;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::Settings;
use crate::error::Result;

/// Text-to-vector encoder. Implementations are deterministic for a fixed
/// model and safe for concurrent callers.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Output dimension; must equal the vector collection dimension.
    fn dim(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Encode in bounded batches so one oversized document cannot produce an
/// unbounded request to the backend.
pub async fn encode_in_batches(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut all = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let embeddings = embedder.encode(batch).await?;
        all.extend(embeddings);
    }
    Ok(all)
}

/// Select the embedding backend: HTTP server when `EMBEDDING_URL` is set,
/// otherwise the in-process fastembed model. The HTTP backend is probed
/// once so its dimension is known before the startup dimension check.
pub async fn select_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    match &settings.embedding_url {
        Some(url) => {
            let embedder = HttpEmbedder::new(url, &settings.embedding_model)?;
            let dim = embedder.probe_dimension().await?;
            info!(url = %url, model = %settings.embedding_model, dim, "embedder adapter: http");
            Ok(Arc::new(embedder))
        }
        None => {
            let embedder = FastEmbedder::new(&settings.embedding_model)?;
            info!(model = %settings.embedding_model, "embedder adapter: fastembed");
            Ok(Arc::new(embedder))
        }
    }
}
