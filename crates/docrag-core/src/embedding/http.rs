use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::Embedder;
use crate::error::{Error, Result};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    content: &'a str,
    input: &'a str,
}

/// Embedder backed by an HTTP embedding server (llama.cpp `/embedding` or
/// an OpenAI-compatible endpoint). Selected when `EMBEDDING_URL` is set.
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    model_name: String,
    dimension: std::sync::OnceLock<usize>,
}

impl HttpEmbedder {
    pub fn new(base_url: &str, model_name: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Permanent(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model_name: model_name.to_string(),
            dimension: std::sync::OnceLock::new(),
        })
    }

    /// Probe the backend once so the startup dimension check can run
    /// before any document is ingested.
    pub async fn probe_dimension(&self) -> Result<usize> {
        let embedding = self.embed_one("dimension probe").await?;
        let dim = embedding.len();
        let _ = self.dimension.set(dim);
        Ok(dim)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            content: text,
            input: text,
        };

        let response = self
            .client
            .post(format!("{}/embedding", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(Error::Transient(format!(
                    "embedding server error: {status} {body}"
                )));
            }
            return Err(Error::Permanent(format!(
                "embedding request rejected: {status} {body}"
            )));
        }

        let json: Value = response.json().await?;
        let embedding = parse_embedding(&json).ok_or_else(|| {
            Error::Permanent(format!("unrecognized embedding response shape: {json}"))
        })?;

        if embedding.is_empty() {
            return Err(Error::Permanent("embedding server returned an empty vector".into()));
        }
        if let Some(&expected) = self.dimension.get() {
            if embedding.len() != expected {
                return Err(Error::Permanent(format!(
                    "embedding dimension changed mid-run: expected {expected}, got {}",
                    embedding.len()
                )));
            }
        } else {
            let _ = self.dimension.set(embedding.len());
        }
        Ok(embedding)
    }
}

/// Accepts `{"embedding": [...]}` (llama.cpp) and
/// `{"data": [{"embedding": [...]}]}` (OpenAI-compatible).
fn parse_embedding(json: &Value) -> Option<Vec<f32>> {
    let array = if let Some(embedding) = json.get("embedding") {
        embedding.as_array()?
    } else {
        json.get("data")?.as_array()?.first()?.get("embedding")?.as_array()?
    };
    array
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(count = texts.len(), "embedding texts over http");
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_one(text).await?);
        }
        Ok(embeddings)
    }

    fn dim(&self) -> usize {
        self.dimension.get().copied().unwrap_or(0)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
