use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use super::{
    cosine_similarity, Distance, ScoredPoint, SearchFilter, VectorPoint, VectorStore,
};
use crate::error::{Error, Result};

#[derive(Serialize, Deserialize)]
struct CollectionMeta {
    dim: usize,
    distance: Distance,
}

/// JSON-file vector store used when no Qdrant endpoint is configured.
///
/// Layout mirrors the blob store: one file per document at
/// `{root}/{workspace_id}/{document_id}.json`, which makes per-document
/// replacement and per-workspace deletion directory operations.
pub struct LocalVectorStore {
    root: PathBuf,
}

impl LocalVectorStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn meta_path(&self) -> PathBuf {
        self.root.join("collection.json")
    }

    fn document_path(&self, workspace_id: Uuid, document_id: Uuid) -> PathBuf {
        self.root
            .join(workspace_id.to_string())
            .join(format!("{document_id}.json"))
    }

    async fn read_points(&self, path: &Path) -> Result<Vec<VectorPoint>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn ensure_collection(&self, dim: usize, distance: Distance) -> Result<()> {
        let meta_path = self.meta_path();
        if fs::try_exists(&meta_path).await? {
            let existing: CollectionMeta = serde_json::from_slice(&fs::read(&meta_path).await?)?;
            if existing.dim != dim {
                return Err(Error::Permanent(format!(
                    "vector dimension mismatch: collection has {}, embedder produces {dim}",
                    existing.dim
                )));
            }
            return Ok(());
        }
        let meta = CollectionMeta { dim, distance };
        fs::write(&meta_path, serde_json::to_vec(&meta)?).await?;
        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        // Points may span documents; group so each file is rewritten once.
        let mut grouped: BTreeMap<(Uuid, Uuid), Vec<VectorPoint>> = BTreeMap::new();
        for point in points {
            grouped
                .entry((point.payload.workspace_id, point.payload.document_id))
                .or_default()
                .push(point);
        }

        for ((workspace_id, document_id), incoming) in grouped {
            let path = self.document_path(workspace_id, document_id);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }

            let mut existing = self.read_points(&path).await?;
            for point in incoming {
                match existing.iter_mut().find(|p| p.id == point.id) {
                    Some(slot) => *slot = point,
                    None => existing.push(point),
                }
            }
            fs::write(&path, serde_json::to_vec(&existing)?).await?;
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredPoint>> {
        let workspace_dir = self.root.join(filter.workspace_id.to_string());
        if !fs::try_exists(&workspace_dir).await? {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredPoint> = Vec::new();
        let mut entries = fs::read_dir(&workspace_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            for point in self.read_points(&path).await? {
                if let Some(document_id) = filter.document_id {
                    if point.payload.document_id != document_id {
                        continue;
                    }
                }
                scored.push(ScoredPoint {
                    score: cosine_similarity(&point.vector, vector),
                    payload: point.payload,
                });
            }
        }

        // Stable sort keeps insertion order for equal scores.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_by_filter(&self, filter: &SearchFilter) -> Result<()> {
        let target = match filter.document_id {
            Some(document_id) => self.document_path(filter.workspace_id, document_id),
            None => self.root.join(filter.workspace_id.to_string()),
        };
        let result = if filter.document_id.is_some() {
            fs::remove_file(&target).await
        } else {
            fs::remove_dir_all(&target).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
