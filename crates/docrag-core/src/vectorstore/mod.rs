pub mod local;
pub mod qdrant;

pub use local::LocalVectorStore;
pub use qdrant::QdrantVectorStore;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{Error, Result};

/// Distance metric of the collection, fixed at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Cosine,
    Dot,
    Euclid,
}

impl Distance {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" => Ok(Self::Dot),
            "euclid" | "euclidean" => Ok(Self::Euclid),
            other => Err(Error::Permanent(format!("unknown distance metric: {other}"))),
        }
    }
}

/// Payload carried by every indexed vector. `workspace_id` is mandatory so
/// searches can always be scoped to one workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPayload {
    pub workspace_id: Uuid,
    pub document_id: Uuid,
    pub document_name: String,
    pub page_start: i64,
    pub page_end: i64,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub score: f32,
    pub payload: VectorPayload,
}

/// Equality filter over payload fields.
#[derive(Debug, Clone)]
pub struct SearchFilter {
    pub workspace_id: Uuid,
    pub document_id: Option<Uuid>,
}

impl SearchFilter {
    pub fn workspace(workspace_id: Uuid) -> Self {
        Self {
            workspace_id,
            document_id: None,
        }
    }

    pub fn document(workspace_id: Uuid, document_id: Uuid) -> Self {
        Self {
            workspace_id,
            document_id: Some(document_id),
        }
    }
}

/// ANN index with payload-filtered similarity search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if missing. An existing collection with a
    /// different dimension is a startup-fatal error.
    async fn ensure_collection(&self, dim: usize, distance: Distance) -> Result<()>;

    /// Insert or replace points by id. Point ids are deterministic per
    /// (document, chunk index), so re-runs converge.
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()>;

    /// Results ordered by decreasing similarity; ties keep insertion order.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredPoint>>;

    async fn delete_by_filter(&self, filter: &SearchFilter) -> Result<()>;
}

/// Select the vector store backend: Qdrant when configured, otherwise a
/// JSON-file store with brute-force cosine search.
pub async fn select_vector_store(settings: &Settings) -> Result<Arc<dyn VectorStore>> {
    match settings.qdrant_endpoint() {
        Some(endpoint) => {
            let store = QdrantVectorStore::connect(
                &endpoint,
                settings.qdrant_api_key.as_deref(),
                &settings.qdrant_collection,
            )?;
            info!(
                endpoint = %endpoint,
                collection = %settings.qdrant_collection,
                "vector store adapter: qdrant"
            );
            Ok(Arc::new(store))
        }
        None => {
            let root = settings.vector_storage_root();
            let store = LocalVectorStore::new(&root)?;
            info!(root = %root, "vector store adapter: local json");
            Ok(Arc::new(store))
        }
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_parsing() {
        assert_eq!(Distance::parse("Cosine").unwrap(), Distance::Cosine);
        assert_eq!(Distance::parse("dot").unwrap(), Distance::Dot);
        assert_eq!(Distance::parse("euclidean").unwrap(), Distance::Euclid);
        assert!(Distance::parse("manhattan").is_err());
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
